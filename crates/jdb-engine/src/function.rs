//! Function records and breakpoint locations.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use jdb_proto::Handle;

/// One place execution can stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointRecord {
    /// Source line (1-based).
    pub line: u32,
    /// Byte-code offset inside the function.
    pub offset: u32,
    /// Display index while active.
    pub active_index: Option<u32>,
}

/// Key of a breakpoint across the whole registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BreakpointId {
    pub handle: Handle,
    pub offset: u32,
}

/// A compiled function as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRecord {
    pub handle: Handle,
    /// `false` for the top-level script scope.
    pub is_function: bool,
    /// Declaration line.
    pub line: u32,
    /// Declaration column.
    pub column: u32,
    /// Empty for top-level code and anonymous functions.
    pub name: String,
    pub source_name: String,
    pub source: Arc<str>,
    /// Breakpoints keyed by offset.
    pub offsets: BTreeMap<u32, BreakpointRecord>,
    /// Line to offset of the breakpoint on that line.
    pub lines: BTreeMap<u32, u32>,
    /// Line and offset of the first reported breakpoint.
    pub first_breakpoint: Option<(u32, u32)>,
}

impl FunctionRecord {
    /// Build a record from the parallel line/offset lists the engine sends.
    ///
    /// The caller guarantees equal lengths.
    pub fn new(
        handle: Handle,
        is_function: bool,
        line: u32,
        column: u32,
        name: String,
        lines: &[u32],
        offsets: &[u32],
    ) -> Self {
        let mut record = Self {
            handle,
            is_function,
            line,
            column,
            name,
            source_name: String::new(),
            source: Arc::from(""),
            offsets: BTreeMap::new(),
            lines: BTreeMap::new(),
            first_breakpoint: lines.first().copied().zip(offsets.first().copied()),
        };
        for (&bp_line, &bp_offset) in lines.iter().zip(offsets) {
            record.offsets.insert(
                bp_offset,
                BreakpointRecord {
                    line: bp_line,
                    offset: bp_offset,
                    active_index: None,
                },
            );
            record.lines.insert(bp_line, bp_offset);
        }
        record
    }

    /// Breakpoint on `line`, if the function has one there.
    pub fn breakpoint_at_line(&self, line: u32) -> Option<&BreakpointRecord> {
        self.lines.get(&line).and_then(|off| self.offsets.get(off))
    }

    /// Breakpoint registered for the first reported line.
    ///
    /// When that line carries several offsets this is the last one seen,
    /// the same record a `file:line` request for that line resolves to.
    pub fn first_line_breakpoint(&self) -> Option<&BreakpointRecord> {
        self.first_breakpoint
            .and_then(|(line, _)| self.breakpoint_at_line(line))
    }

    /// The first reported breakpoint.
    pub fn first_breakpoint(&self) -> Option<&BreakpointRecord> {
        self.first_breakpoint
            .and_then(|(_, offset)| self.offsets.get(&offset))
    }

    pub fn breakpoint_id(&self, offset: u32) -> BreakpointId {
        BreakpointId {
            handle: self.handle,
            offset,
        }
    }

    /// Human readable location of `breakpoint` inside this function.
    pub fn describe(&self, breakpoint: &BreakpointRecord) -> String {
        BreakpointDisplay {
            function: self,
            line: breakpoint.line,
        }
        .to_string()
    }
}

/// `source:line`, plus the enclosing function for non top-level code.
struct BreakpointDisplay<'a> {
    function: &'a FunctionRecord,
    line: u32,
}

impl fmt::Display for BreakpointDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.function;
        if func.source_name.is_empty() {
            write!(f, "[unknown]:{}", self.line)?;
        } else {
            write!(f, "{}:{}", func.source_name, self.line)?;
        }
        if func.is_function {
            let name = if func.name.is_empty() {
                "function"
            } else {
                func.name.as_str()
            };
            write!(
                f,
                " (in {}() at line:{}, col:{})",
                name, func.line, func.column
            )?;
        }
        Ok(())
    }
}
