//! Named-section timing accumulator.
//!
//! Each section moves `Idle -> Started` on `begin` and back to `Idle` on
//! `end`, adding the elapsed cycles to its accumulator. A global window
//! (`start_measuring` / `stop_measuring`) gates every section: begin/end
//! calls made while the window is closed are ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, error};

use crate::cycles::CycleSource;

#[cfg(test)]
mod tests;

/// Result type for instrumentation operations.
pub type Result<T> = std::result::Result<T, InstrumentationError>;

/// Identity of a measurement section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SectionId(pub u8);

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mismatched begin/end usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    BeginWhileStarted,
    EndWhileIdle,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::BeginWhileStarted => write!(f, "begin while already started"),
            Violation::EndWhileIdle => write!(f, "end without matching begin"),
        }
    }
}

/// Errors raised by the instrumentation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstrumentationError {
    #[error("Protocol violation on section '{name}' ({id}): {violation}")]
    ProtocolViolation {
        id: SectionId,
        name: String,
        violation: Violation,
    },

    #[error("Unknown measurement section {0}")]
    UnknownSection(SectionId),
}

/// Point-in-time copy of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionSnapshot {
    pub id: SectionId,
    pub name: String,
    pub accumulated_cycles: u64,
    pub invocations: u64,
    pub started: bool,
}

impl SectionSnapshot {
    /// Mean cycles per invocation; `None` when the section never ran.
    pub fn average_cycles(&self) -> Option<u64> {
        self.accumulated_cycles.checked_div(self.invocations)
    }
}

#[derive(Debug)]
struct Section {
    name: String,
    accumulated: u64,
    invocations: u64,
    started_at: Option<u64>,
}

#[derive(Debug, Default)]
struct Counters {
    sections: BTreeMap<SectionId, Section>,
    window_started_at: Option<u64>,
    window_cycles: u64,
    violations: u64,
}

/// Section timing accumulator over an injected cycle source.
pub struct Instrumentation {
    source: Arc<dyn CycleSource>,
    counters: Mutex<Counters>,
}

impl Instrumentation {
    pub fn new(source: Arc<dyn CycleSource>) -> Self {
        Self {
            source,
            counters: Mutex::new(Counters::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn frequency_hz(&self) -> u64 {
        self.source.frequency_hz()
    }

    /// Declare a section. Re-registering an id renames it and clears it.
    pub fn register(&self, id: SectionId, name: impl Into<String>) {
        self.lock().sections.insert(
            id,
            Section {
                name: name.into(),
                accumulated: 0,
                invocations: 0,
                started_at: None,
            },
        );
    }

    /// Zero every section, the global window and the violation count.
    pub fn reset(&self) {
        let mut counters = self.lock();
        for section in counters.sections.values_mut() {
            section.accumulated = 0;
            section.invocations = 0;
            section.started_at = None;
        }
        counters.window_started_at = None;
        counters.window_cycles = 0;
        counters.violations = 0;
        debug!(sections = counters.sections.len(), "Instrumentation reset");
    }

    /// Open the global window.
    pub fn start_measuring(&self) {
        let now = self.source.now();
        let mut counters = self.lock();
        if counters.window_started_at.is_none() {
            counters.window_started_at = Some(now);
        }
    }

    /// Close the global window, adding its length to the total.
    pub fn stop_measuring(&self) {
        let now = self.source.now();
        let mut counters = self.lock();
        if let Some(start) = counters.window_started_at.take() {
            counters.window_cycles += now.saturating_sub(start);
        }
    }

    pub fn is_measuring(&self) -> bool {
        self.lock().window_started_at.is_some()
    }

    /// Cycles spent inside the global window so far.
    pub fn total_cycles(&self) -> u64 {
        let counters = self.lock();
        match counters.window_started_at {
            Some(start) => counters.window_cycles + self.source.now().saturating_sub(start),
            None => counters.window_cycles,
        }
    }

    /// Protocol violations observed since the last reset.
    pub fn violations(&self) -> u64 {
        self.lock().violations
    }

    /// Enter section `id`.
    pub fn begin(&self, id: SectionId) -> Result<()> {
        let mut counters = self.lock();
        let measuring = counters.window_started_at.is_some();
        let section = counters
            .sections
            .get_mut(&id)
            .ok_or(InstrumentationError::UnknownSection(id))?;
        if !measuring {
            return Ok(());
        }
        if section.started_at.is_some() {
            let err = violation(id, section, Violation::BeginWhileStarted);
            counters.violations += 1;
            return Err(err);
        }
        section.invocations += 1;
        // Read last so the bookkeeping above stays outside the section.
        section.started_at = Some(self.source.now());
        Ok(())
    }

    /// Leave section `id`, accumulating the cycles since `begin`.
    pub fn end(&self, id: SectionId) -> Result<()> {
        // Read first so the bookkeeping below stays outside the section.
        let now = self.source.now();
        let mut counters = self.lock();
        let measuring = counters.window_started_at.is_some();
        let section = counters
            .sections
            .get_mut(&id)
            .ok_or(InstrumentationError::UnknownSection(id))?;
        if !measuring {
            return Ok(());
        }
        match section.started_at.take() {
            Some(start) => {
                section.accumulated += now.saturating_sub(start);
                Ok(())
            }
            None => {
                let err = violation(id, section, Violation::EndWhileIdle);
                counters.violations += 1;
                Err(err)
            }
        }
    }

    pub fn section(&self, id: SectionId) -> Result<SectionSnapshot> {
        self.lock()
            .sections
            .get(&id)
            .map(|section| snapshot(id, section))
            .ok_or(InstrumentationError::UnknownSection(id))
    }

    /// All sections in id order.
    pub fn sections(&self) -> Vec<SectionSnapshot> {
        self.lock()
            .sections
            .iter()
            .map(|(id, section)| snapshot(*id, section))
            .collect()
    }

    /// `accumulated / invocations`, or `None` when the section has no data.
    pub fn average_cycles(&self, id: SectionId) -> Result<Option<u64>> {
        Ok(self.section(id)?.average_cycles())
    }
}

fn snapshot(id: SectionId, section: &Section) -> SectionSnapshot {
    SectionSnapshot {
        id,
        name: section.name.clone(),
        accumulated_cycles: section.accumulated,
        invocations: section.invocations,
        started: section.started_at.is_some(),
    }
}

fn violation(id: SectionId, section: &Section, violation: Violation) -> InstrumentationError {
    error!(section = %section.name, id = %id, %violation, "Measurement protocol violation");
    InstrumentationError::ProtocolViolation {
        id,
        name: section.name.clone(),
        violation,
    }
}
