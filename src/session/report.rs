//! Latency report rendered once all participants have completed.

use std::fmt;

use serde::Serialize;

use crate::instrumentation::{Instrumentation, Result, SectionId, SectionSnapshot};

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// One table row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionRow {
    pub id: SectionId,
    pub name: String,
    /// Share of the global window.
    pub percent: f64,
    pub seconds: f64,
    pub cycles: u64,
    pub occurrences: u64,
    pub average_cycles: Option<u64>,
}

/// Derived context-switch latency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchLatency {
    /// Mean of the hand-off section averages.
    pub average_cycles: u64,
    /// Baseline signal/wait average that was subtracted.
    pub baseline_cycles: u64,
    pub net_cycles: u64,
    pub seconds: f64,
    pub micros: f64,
}

/// Final measurement report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub frequency_hz: u64,
    pub total_cycles: u64,
    pub total_seconds: f64,
    pub sections: Vec<SectionRow>,
    /// `None` when no hand-off section collected data.
    pub switch: Option<SwitchLatency>,
    pub violations: u64,
}

impl Report {
    /// Snapshot `instrumentation` and derive the switch latency from the
    /// `switches` sections minus the `baseline` section.
    pub fn build(
        instrumentation: &Instrumentation,
        baseline: SectionId,
        switches: [SectionId; 2],
    ) -> Result<Self> {
        let frequency_hz = instrumentation.frequency_hz();
        let total_cycles = instrumentation.total_cycles();
        let sections = instrumentation
            .sections()
            .iter()
            .map(|section| row(section, total_cycles, frequency_hz))
            .collect();

        let averages: Vec<u64> = switches
            .iter()
            .map(|id| instrumentation.average_cycles(*id))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();
        let baseline_cycles = instrumentation.average_cycles(baseline)?.unwrap_or(0);

        let switch = (!averages.is_empty()).then(|| {
            let average_cycles = averages.iter().sum::<u64>() / averages.len() as u64;
            let net_cycles = average_cycles.saturating_sub(baseline_cycles);
            let seconds = to_seconds(net_cycles, frequency_hz);
            SwitchLatency {
                average_cycles,
                baseline_cycles,
                net_cycles,
                seconds,
                micros: seconds * MICROS_PER_SECOND,
            }
        });

        Ok(Self {
            frequency_hz,
            total_cycles,
            total_seconds: to_seconds(total_cycles, frequency_hz),
            sections,
            switch,
            violations: instrumentation.violations(),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn row(section: &SectionSnapshot, total_cycles: u64, frequency_hz: u64) -> SectionRow {
    let percent = if total_cycles == 0 {
        0.0
    } else {
        section.accumulated_cycles as f64 * 100.0 / total_cycles as f64
    };
    SectionRow {
        id: section.id,
        name: section.name.clone(),
        percent,
        seconds: to_seconds(section.accumulated_cycles, frequency_hz),
        cycles: section.accumulated_cycles,
        occurrences: section.invocations,
        average_cycles: section.average_cycles(),
    }
}

fn to_seconds(cycles: u64, frequency_hz: u64) -> f64 {
    if frequency_hz == 0 {
        return 0.0;
    }
    cycles as f64 / frequency_hz as f64
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--Performance Counter Report--")?;
        writeln!(
            f,
            "Total Time: {:.6} seconds ({} clock-cycles)",
            self.total_seconds, self.total_cycles
        )?;
        writeln!(
            f,
            "| {:<16} | {:>6} | {:>10} | {:>14} | {:>11} | {:>10} |",
            "Section", "%", "Time (sec)", "Time (clocks)", "Occurrences", "Avg"
        )?;
        for row in &self.sections {
            let average = row
                .average_cycles
                .map_or_else(|| "n/a".to_string(), |avg| avg.to_string());
            writeln!(
                f,
                "| {:<16} | {:>6.2} | {:>10.6} | {:>14} | {:>11} | {:>10} |",
                row.name, row.percent, row.seconds, row.cycles, row.occurrences, average
            )?;
        }
        writeln!(f)?;
        match &self.switch {
            Some(switch) => {
                writeln!(
                    f,
                    "Context switch average no. of CPU cycles: {}",
                    switch.average_cycles
                )?;
                writeln!(
                    f,
                    "Context switch cpu cycle average minus semaphore post/pending function call cycles: {}",
                    switch.net_cycles
                )?;
                writeln!(
                    f,
                    "Average context switch time: {:.6}s ({:.6}us)",
                    switch.seconds, switch.micros
                )?;
            }
            None => writeln!(f, "Context switch average: no data")?,
        }
        write!(f, "Protocol violations: {}", self.violations)
    }
}
