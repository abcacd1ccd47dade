//! Breakpoint registry.
//!
//! Owns every registered function, the line multimap used to find all
//! copies of a source line, the table of active breakpoints and the list
//! of pending requests. The registry never talks to the transport; callers
//! turn the returned [`Activation`]s and ids into outbound messages.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;

use jdb_proto::Handle;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{CommandError, EngineError};
use crate::event::Location;
use crate::function::{BreakpointId, FunctionRecord};

fn location_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+):([1-9][0-9]*)$").expect("location regex is valid"))
}

/// Split `file:line`. `None` for anything else, bare function names included.
fn parse_location(spec: &str) -> Option<(&str, u32)> {
    let caps = location_regex().captures(spec)?;
    let file = caps.get(1)?.as_str();
    let line = caps.get(2)?.as_str().parse().ok()?;
    Some((file, line))
}

fn source_matches(source_name: &str, file: &str) -> bool {
    source_name == file
        || source_name.ends_with(&format!("/{file}"))
        || source_name.ends_with(&format!("\\{file}"))
}

/// A breakpoint request waiting for matching code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingBreakpoint {
    /// A line whose file is taken from the next parsed source.
    Line(u32),
    /// `file:line`.
    Location(String),
    /// A function name.
    Function(String),
}

impl PendingBreakpoint {
    /// Classify a spec as written by the user.
    pub fn from_spec(spec: &str) -> Self {
        if parse_location(spec).is_some() {
            Self::Location(spec.to_string())
        } else {
            Self::Function(spec.to_string())
        }
    }
}

impl fmt::Display for PendingBreakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(line) => write!(f, "{line}"),
            Self::Location(spec) | Self::Function(spec) => f.write_str(spec),
        }
    }
}

/// Result of activating one breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub index: u32,
    pub id: BreakpointId,
    /// `false` when the breakpoint was already active.
    pub newly: bool,
    pub description: String,
}

/// Outcome of [`BreakpointRegistry::resolve_location`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// One activation per matching function.
    Activated(Vec<Activation>),
    /// Nothing matched; the request was queued.
    Pending(PendingBreakpoint),
    /// Nothing matched and queuing was not requested.
    NotFound,
}

/// Function table plus breakpoint bookkeeping for one session.
#[derive(Debug)]
pub struct BreakpointRegistry {
    functions: BTreeMap<Handle, FunctionRecord>,
    line_index: BTreeMap<u32, BTreeSet<Handle>>,
    active: BTreeMap<u32, BreakpointId>,
    next_index: u32,
    pending: Vec<PendingBreakpoint>,
}

impl BreakpointRegistry {
    /// An empty registry whose first activation gets index 1.
    pub fn new() -> Self {
        Self {
            functions: BTreeMap::new(),
            line_index: BTreeMap::new(),
            active: BTreeMap::new(),
            next_index: 1,
            pending: Vec::new(),
        }
    }

    /// Drop everything, including pending requests and the index counter.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Register the functions of a completed parse unit.
    pub fn insert_unit(&mut self, records: Vec<FunctionRecord>) -> Vec<Handle> {
        let mut handles = Vec::with_capacity(records.len());
        for record in records {
            let handle = record.handle;
            if let Ok(old) = self.release(handle) {
                let lost: Vec<u32> = old
                    .offsets
                    .values()
                    .filter_map(|bp| bp.active_index)
                    .collect();
                warn!(%handle, ?lost, "function registered twice, replacing");
            }
            for line in record.lines.keys() {
                self.line_index.entry(*line).or_default().insert(handle);
            }
            debug!(%handle, name = %record.name, breakpoints = record.offsets.len(), "function registered");
            self.functions.insert(handle, record);
            handles.push(handle);
        }
        handles
    }

    /// Forget a function and every breakpoint in it.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownHandle`] if the function is not registered.
    pub fn release(&mut self, handle: Handle) -> Result<FunctionRecord, EngineError> {
        let record = self
            .functions
            .remove(&handle)
            .ok_or(EngineError::UnknownHandle(handle))?;

        for line in record.lines.keys() {
            if let Some(set) = self.line_index.get_mut(line) {
                set.remove(&handle);
                if set.is_empty() {
                    self.line_index.remove(line);
                }
            }
        }
        for bp in record.offsets.values() {
            if let Some(index) = bp.active_index {
                self.active.remove(&index);
            }
        }
        debug!(%handle, "function released");
        Ok(record)
    }

    /// Resolve a `file:line` or function-name request and activate every
    /// match.
    pub fn resolve_location(&mut self, spec: &str, pending: bool) -> Resolution {
        let location = parse_location(spec);
        let targets: Vec<BreakpointId> = match location {
            Some((file, line)) => self
                .line_index
                .get(&line)
                .into_iter()
                .flatten()
                .filter_map(|handle| self.functions.get(handle))
                .filter(|func| source_matches(&func.source_name, file))
                .filter_map(|func| {
                    func.breakpoint_at_line(line)
                        .map(|bp| func.breakpoint_id(bp.offset))
                })
                .collect(),
            None => self
                .functions
                .values()
                .filter(|func| func.name == spec)
                .filter_map(|func| {
                    func.first_line_breakpoint()
                        .map(|bp| func.breakpoint_id(bp.offset))
                })
                .collect(),
        };

        if targets.is_empty() {
            info!(spec, "breakpoint not found");
            if !pending {
                return Resolution::NotFound;
            }
            let entry = match location {
                Some((_, line)) => PendingBreakpoint::Line(line),
                None => PendingBreakpoint::Function(spec.to_string()),
            };
            info!(pending = %entry, "pending breakpoint added");
            self.pending.push(entry.clone());
            return Resolution::Pending(entry);
        }

        Resolution::Activated(targets.into_iter().filter_map(|id| self.activate(id)).collect())
    }

    /// Activate a breakpoint. Already active breakpoints keep their index.
    pub fn activate(&mut self, id: BreakpointId) -> Option<Activation> {
        let func = self.functions.get_mut(&id.handle)?;
        let bp = func.offsets.get_mut(&id.offset)?;

        let newly = bp.active_index.is_none();
        let index = match bp.active_index {
            Some(index) => index,
            None => {
                let index = self.next_index;
                self.next_index += 1;
                bp.active_index = Some(index);
                self.active.insert(index, id);
                index
            }
        };

        let bp = *bp;
        let description = func.describe(&bp);
        info!("Breakpoint {index} at {description}");
        Some(Activation {
            index,
            id,
            newly,
            description,
        })
    }

    /// Deactivate the breakpoint with display index `index`.
    ///
    /// # Errors
    ///
    /// [`CommandError::UnknownIndex`] if no active breakpoint has it.
    pub fn deactivate(&mut self, index: u32) -> Result<BreakpointId, CommandError> {
        let id = self
            .active
            .remove(&index)
            .ok_or(CommandError::UnknownIndex(index))?;
        self.clear_active_index(id);
        info!("Breakpoint {index} is deleted");
        Ok(id)
    }

    /// Deactivate every active breakpoint, returning what was cleared.
    pub fn deactivate_all(&mut self) -> Vec<(u32, BreakpointId)> {
        let cleared: Vec<(u32, BreakpointId)> = std::mem::take(&mut self.active).into_iter().collect();
        for (_, id) in &cleared {
            self.clear_active_index(*id);
        }
        if cleared.is_empty() {
            info!("No active breakpoints");
        }
        cleared
    }

    fn clear_active_index(&mut self, id: BreakpointId) {
        if let Some(bp) = self
            .functions
            .get_mut(&id.handle)
            .and_then(|func| func.offsets.get_mut(&id.offset))
        {
            bp.active_index = None;
        }
    }

    /// Map a reported stop position to the breakpoint it belongs to.
    ///
    /// # Errors
    ///
    /// [`EngineError::MissingFunction`] for unknown handles and
    /// [`EngineError::NoBreakpoints`] for functions without locations.
    pub fn resolve_stop(&self, handle: Handle, offset: u32) -> Result<Location, EngineError> {
        let func = self
            .functions
            .get(&handle)
            .ok_or(EngineError::MissingFunction(handle))?;

        let (bp, exact) = match func.offsets.get(&offset) {
            Some(bp) => (bp, true),
            None => {
                let first = func
                    .first_breakpoint()
                    .ok_or(EngineError::NoBreakpoints(handle))?;
                if offset < first.offset {
                    (first, false)
                } else {
                    let nearest = func
                        .offsets
                        .range(..offset)
                        .next_back()
                        .map_or(first, |(_, bp)| bp);
                    (nearest, false)
                }
            }
        };

        Ok(Location {
            handle,
            line: bp.line,
            offset: bp.offset,
            active_index: bp.active_index,
            exact,
            description: func.describe(bp),
        })
    }

    /// Retry pending requests against newly parsed code from `source_name`.
    ///
    /// Line-only entries are qualified with `source_name` first. Entries
    /// that resolve are removed and returned with their activations.
    pub fn resolve_pending(&mut self, source_name: &str) -> Vec<(String, Vec<Activation>)> {
        if self.pending.is_empty() {
            debug!("no pending breakpoints");
            return Vec::new();
        }
        info!(count = self.pending.len(), "available pending breakpoints");

        let mut resolved = Vec::new();
        for entry in std::mem::take(&mut self.pending) {
            let entry = match entry {
                PendingBreakpoint::Line(line) => {
                    PendingBreakpoint::Location(format!("{source_name}:{line}"))
                }
                other => other,
            };
            let spec = entry.to_string();
            debug!(%spec, "trying pending breakpoint");
            match self.resolve_location(&spec, false) {
                Resolution::Activated(activations) => resolved.push((spec, activations)),
                _ => self.pending.push(entry),
            }
        }
        resolved
    }

    /// Queue a request without trying to resolve it.
    pub fn add_pending(&mut self, entry: PendingBreakpoint) {
        self.pending.push(entry);
    }

    /// Remove the pending entry at `index`.
    pub fn delete_pending(&mut self, index: usize) -> Result<PendingBreakpoint, CommandError> {
        if index >= self.pending.len() {
            return Err(CommandError::UnknownPendingIndex(index));
        }
        let entry = self.pending.remove(index);
        info!("Pending breakpoint {index} is deleted");
        Ok(entry)
    }

    /// Queued requests in the order they were added.
    pub fn pending(&self) -> &[PendingBreakpoint] {
        &self.pending
    }

    /// Display index the next activation will receive.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Active breakpoints in index order with their display text.
    pub fn active(&self) -> Vec<(u32, String)> {
        self.active
            .iter()
            .filter_map(|(index, id)| {
                let func = self.functions.get(&id.handle)?;
                let bp = func.offsets.get(&id.offset)?;
                Some((*index, func.describe(bp)))
            })
            .collect()
    }

    /// Look up a registered function.
    pub fn function(&self, handle: Handle) -> Option<&FunctionRecord> {
        self.functions.get(&handle)
    }

    /// Every registered function, ordered by handle.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionRecord> {
        self.functions.values()
    }

    /// Handles of every function with a breakpoint on `line`.
    pub fn functions_on_line(&self, line: u32) -> Vec<Handle> {
        self.line_index
            .get(&line)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every `(source name, line)` that can carry a breakpoint.
    pub fn breakpoint_lines(&self) -> BTreeSet<(String, u32)> {
        self.functions
            .values()
            .flat_map(|func| {
                func.lines
                    .keys()
                    .map(move |line| (func.source_name.clone(), *line))
            })
            .collect()
    }
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(handle: u32, name: &str, source: &str, lines: &[u32], offsets: &[u32]) -> FunctionRecord {
        let mut r = FunctionRecord::new(
            Handle(handle),
            !name.is_empty(),
            1,
            1,
            name.to_string(),
            lines,
            offsets,
        );
        r.source_name = source.to_string();
        r
    }

    fn scenario() -> BreakpointRegistry {
        let mut reg = BreakpointRegistry::new();
        reg.insert_unit(vec![func(0x10, "", "a.js", &[1, 2], &[0, 10])]);
        reg
    }

    fn activated(res: Resolution) -> Vec<Activation> {
        match res {
            Resolution::Activated(a) => a,
            other => panic!("expected activation, got {other:?}"),
        }
    }

    #[test]
    fn insert_unit_fills_line_index_once_per_pair() {
        let reg = scenario();
        let f = reg.function(Handle(0x10)).unwrap();
        assert_eq!(f.lines.len(), 2);
        assert_eq!(reg.functions_on_line(1), vec![Handle(0x10)]);
        assert_eq!(reg.functions_on_line(2), vec![Handle(0x10)]);
        assert!(reg.functions_on_line(3).is_empty());
    }

    #[test]
    fn file_line_activates_with_first_index() {
        let mut reg = scenario();
        let acts = activated(reg.resolve_location("a.js:2", false));
        assert_eq!(acts.len(), 1);
        assert_eq!(acts[0].index, 1);
        assert!(acts[0].newly);
        assert_eq!(acts[0].id.offset, 10);
        assert_eq!(reg.next_index(), 2);
        assert_eq!(reg.active(), vec![(1, "a.js:2".to_string())]);
    }

    #[test]
    fn stop_resolution_at_and_around() {
        let mut reg = scenario();
        activated(reg.resolve_location("a.js:2", false));

        let at = reg.resolve_stop(Handle(0x10), 10).unwrap();
        assert!(at.exact);
        assert_eq!(at.line, 2);
        assert_eq!(at.active_index, Some(1));

        let around = reg.resolve_stop(Handle(0x10), 5).unwrap();
        assert!(!around.exact);
        assert_eq!(around.line, 1);
        assert_eq!(around.offset, 0);

        let past_end = reg.resolve_stop(Handle(0x10), 500).unwrap();
        assert_eq!(past_end.line, 2);
        assert!(!past_end.exact);
    }

    #[test]
    fn stop_before_first_breakpoint_is_around_first() {
        let mut reg = BreakpointRegistry::new();
        reg.insert_unit(vec![func(1, "f", "a.js", &[3, 4], &[8, 20])]);
        let loc = reg.resolve_stop(Handle(1), 2).unwrap();
        assert!(!loc.exact);
        assert_eq!(loc.line, 3);
    }

    #[test]
    fn stop_in_unknown_function_is_fatal() {
        let reg = scenario();
        assert!(matches!(
            reg.resolve_stop(Handle(99), 0),
            Err(EngineError::MissingFunction(Handle(99)))
        ));
    }

    #[test]
    fn stop_in_function_without_breakpoints_is_fatal() {
        let mut reg = BreakpointRegistry::new();
        reg.insert_unit(vec![func(2, "g", "a.js", &[], &[])]);
        assert!(matches!(
            reg.resolve_stop(Handle(2), 4),
            Err(EngineError::NoBreakpoints(_))
        ));
    }

    #[test]
    fn activating_twice_keeps_index() {
        let mut reg = scenario();
        activated(reg.resolve_location("a.js:2", false));
        let again = activated(reg.resolve_location("a.js:2", false));
        assert_eq!(again[0].index, 1);
        assert!(!again[0].newly);
        assert_eq!(reg.active().len(), 1);
        assert_eq!(reg.next_index(), 2);
    }

    #[test]
    fn shared_line_activates_every_copy() {
        let mut reg = BreakpointRegistry::new();
        reg.insert_unit(vec![func(1, "", "dir/a.js", &[5], &[0])]);
        reg.insert_unit(vec![func(2, "", "other\\a.js", &[5], &[4])]);
        reg.insert_unit(vec![func(3, "", "b.js", &[5], &[4])]);
        let acts = activated(reg.resolve_location("a.js:5", false));
        let handles: Vec<Handle> = acts.iter().map(|a| a.id.handle).collect();
        assert_eq!(handles, vec![Handle(1), Handle(2)]);
        assert_eq!(acts[1].index, 2);
    }

    #[test]
    fn suffix_match_requires_separator() {
        let mut reg = BreakpointRegistry::new();
        reg.insert_unit(vec![func(1, "", "data.js", &[5], &[0])]);
        assert_eq!(reg.resolve_location("a.js:5", false), Resolution::NotFound);
    }

    #[test]
    fn function_name_uses_first_breakpoint() {
        let mut reg = BreakpointRegistry::new();
        reg.insert_unit(vec![
            func(1, "foo", "a.js", &[7, 8], &[3, 9]),
            func(2, "", "a.js", &[1], &[0]),
        ]);
        let acts = activated(reg.resolve_location("foo", false));
        assert_eq!(acts.len(), 1);
        assert_eq!(acts[0].id, BreakpointId { handle: Handle(1), offset: 3 });
    }

    #[test]
    fn function_name_and_first_line_agree() {
        let mut reg = BreakpointRegistry::new();
        reg.insert_unit(vec![func(1, "foo", "a.js", &[3, 3, 4], &[0, 8, 12])]);
        let by_line = activated(reg.resolve_location("a.js:3", false));
        let by_name = activated(reg.resolve_location("foo", false));
        assert_eq!(by_line[0].id.offset, 8);
        assert_eq!(by_name[0].id, by_line[0].id);
        assert_eq!(by_name[0].index, 1);
        assert!(!by_name[0].newly);
    }

    #[test]
    fn duplicate_handle_replaces_function_and_drops_its_breakpoints() {
        let mut reg = BreakpointRegistry::new();
        reg.insert_unit(vec![func(1, "", "a.js", &[5, 6], &[0, 4])]);
        activated(reg.resolve_location("a.js:6", false));

        reg.insert_unit(vec![func(1, "", "b.js", &[9], &[2])]);
        assert!(reg.active().is_empty());
        assert!(reg.functions_on_line(6).is_empty());
        assert_eq!(reg.functions_on_line(9), vec![Handle(1)]);
        assert_eq!(reg.function(Handle(1)).unwrap().source_name, "b.js");

        let acts = activated(reg.resolve_location("b.js:9", false));
        assert_eq!(acts[0].index, 2);
    }

    #[test]
    fn not_found_with_and_without_pending() {
        let mut reg = scenario();
        assert_eq!(reg.resolve_location("b.js:4", false), Resolution::NotFound);
        assert!(reg.pending().is_empty());

        assert_eq!(
            reg.resolve_location("b.js:4", true),
            Resolution::Pending(PendingBreakpoint::Line(4))
        );
        assert_eq!(
            reg.resolve_location("main", true),
            Resolution::Pending(PendingBreakpoint::Function("main".into()))
        );
        assert_eq!(reg.pending().len(), 2);
    }

    #[test]
    fn deactivate_single_and_unknown() {
        let mut reg = scenario();
        activated(reg.resolve_location("a.js:1", false));
        let id = reg.deactivate(1).unwrap();
        assert_eq!(id.offset, 0);
        assert!(reg.active().is_empty());
        assert!(reg.function(Handle(0x10)).unwrap().offsets[&0].active_index.is_none());
        assert!(matches!(reg.deactivate(1), Err(CommandError::UnknownIndex(1))));
    }

    #[test]
    fn indices_are_never_reused() {
        let mut reg = scenario();
        activated(reg.resolve_location("a.js:1", false));
        reg.deactivate(1).unwrap();
        let acts = activated(reg.resolve_location("a.js:1", false));
        assert_eq!(acts[0].index, 2);
    }

    #[test]
    fn deactivate_all_clears_everything() {
        let mut reg = scenario();
        activated(reg.resolve_location("a.js:1", false));
        activated(reg.resolve_location("a.js:2", false));
        let cleared = reg.deactivate_all();
        assert_eq!(cleared.len(), 2);
        assert!(reg.active().is_empty());
        assert!(reg.deactivate_all().is_empty());
    }

    #[test]
    fn release_removes_breakpoints_and_lines() {
        let mut reg = scenario();
        activated(reg.resolve_location("a.js:2", false));
        let record = reg.release(Handle(0x10)).unwrap();
        assert_eq!(record.handle, Handle(0x10));
        assert!(reg.active().is_empty());
        assert!(reg.functions_on_line(2).is_empty());
        assert_eq!(reg.resolve_location("a.js:2", false), Resolution::NotFound);
    }

    #[test]
    fn release_keeps_other_functions_on_shared_line() {
        let mut reg = BreakpointRegistry::new();
        reg.insert_unit(vec![func(1, "", "a.js", &[5], &[0])]);
        reg.insert_unit(vec![func(2, "", "a.js", &[5], &[0])]);
        reg.release(Handle(1)).unwrap();
        assert_eq!(reg.functions_on_line(5), vec![Handle(2)]);
        assert_eq!(activated(reg.resolve_location("a.js:5", false)).len(), 1);
    }

    #[test]
    fn release_unknown_is_error() {
        let mut reg = scenario();
        assert!(matches!(
            reg.release(Handle(5)),
            Err(EngineError::UnknownHandle(Handle(5)))
        ));
    }

    #[test]
    fn pending_line_is_qualified_and_removed() {
        let mut reg = BreakpointRegistry::new();
        reg.resolve_location("x.js:2", true);
        reg.resolve_location("nope", true);
        reg.insert_unit(vec![func(1, "", "a.js", &[1, 2], &[0, 10])]);

        let resolved = reg.resolve_pending("a.js");
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].0, "a.js:2");
        assert_eq!(resolved[0].1[0].index, 1);
        assert_eq!(reg.pending(), &[PendingBreakpoint::Function("nope".into())]);
    }

    #[test]
    fn unresolved_line_stays_qualified() {
        let mut reg = BreakpointRegistry::new();
        reg.resolve_location("x.js:9", true);
        reg.insert_unit(vec![func(1, "", "a.js", &[1], &[0])]);
        assert!(reg.resolve_pending("a.js").is_empty());
        assert_eq!(reg.pending(), &[PendingBreakpoint::Location("a.js:9".into())]);
    }

    #[test]
    fn pending_function_resolves_later() {
        let mut reg = BreakpointRegistry::new();
        reg.add_pending(PendingBreakpoint::from_spec("main"));
        reg.insert_unit(vec![func(4, "main", "m.js", &[3], &[1])]);
        let resolved = reg.resolve_pending("m.js");
        assert_eq!(resolved[0].0, "main");
        assert!(reg.pending().is_empty());
    }

    #[test]
    fn delete_pending_by_index() {
        let mut reg = BreakpointRegistry::new();
        reg.add_pending(PendingBreakpoint::from_spec("a.js:3"));
        assert!(matches!(
            reg.delete_pending(1),
            Err(CommandError::UnknownPendingIndex(1))
        ));
        assert_eq!(
            reg.delete_pending(0).unwrap(),
            PendingBreakpoint::Location("a.js:3".into())
        );
    }

    #[test]
    fn breakpoint_lines_lists_every_location() {
        let mut reg = scenario();
        reg.insert_unit(vec![func(2, "", "b.js", &[4], &[0])]);
        let lines: Vec<(String, u32)> = reg.breakpoint_lines().into_iter().collect();
        assert_eq!(
            lines,
            vec![
                ("a.js".to_string(), 1),
                ("a.js".to_string(), 2),
                ("b.js".to_string(), 4)
            ]
        );
    }

    #[test]
    fn clear_resets_index_counter() {
        let mut reg = scenario();
        activated(reg.resolve_location("a.js:2", false));
        reg.clear();
        assert_eq!(reg.next_index(), 1);
        assert_eq!(reg.functions().count(), 0);
    }
}
