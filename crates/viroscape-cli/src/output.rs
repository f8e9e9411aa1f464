//! Per-tick census rows.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::io::Write;
use viroscape_core::{Census, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One header line, then one comma-separated row per tick
    Csv,
    /// One JSON object per tick
    Json,
}

#[derive(Serialize)]
struct Row<'a> {
    tick: Tick,
    #[serde(flatten)]
    census: &'a Census,
}

/// Writes one census row per tick in the chosen format.
pub struct CensusWriter<W: Write> {
    format: OutputFormat,
    sink: W,
}

impl<W: Write> CensusWriter<W> {
    /// Create a writer, emitting the CSV header straight away.
    pub fn new(format: OutputFormat, mut sink: W) -> Result<Self> {
        if format == OutputFormat::Csv {
            writeln!(sink, "{}", Census::csv_header()).context("Failed to write census header")?;
        }
        Ok(Self { format, sink })
    }

    pub fn write(&mut self, tick: Tick, census: &Census) -> Result<()> {
        let line = match self.format {
            OutputFormat::Csv => census.csv_row(tick),
            OutputFormat::Json => serde_json::to_string(&Row { tick, census })
                .context("Failed to encode census row")?,
        };
        writeln!(self.sink, "{}", line).context("Failed to write census row")
    }

    pub fn finish(mut self) -> Result<W> {
        self.sink.flush().context("Failed to flush census output")?;
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn census() -> Census {
        Census {
            healthy_cells: 90,
            infected_cells: 6,
            dead_cells: 4,
            free_virions: 12,
            innate_cells: 3,
            specialised_cells: 1,
            total_agents: 116,
        }
    }

    #[test]
    fn test_csv_rows() {
        let mut writer = CensusWriter::new(OutputFormat::Csv, Vec::new()).unwrap();
        writer.write(0, &census()).unwrap();
        writer.write(1, &Census::default()).unwrap();
        let text = String::from_utf8(writer.finish().unwrap()).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "tick,healthy,infected,dead,virions,innate,specialised,total");
        assert_eq!(lines[1], "0,90,6,4,12,3,1,116");
        assert_eq!(lines[2], "1,0,0,0,0,0,0,0");
    }

    #[test]
    fn test_json_lines() {
        let mut writer = CensusWriter::new(OutputFormat::Json, Vec::new()).unwrap();
        writer.write(7, &census()).unwrap();
        let text = String::from_utf8(writer.finish().unwrap()).unwrap();

        assert_eq!(text.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["tick"], 7);
        assert_eq!(value["healthy_cells"], 90);
        assert_eq!(value["free_virions"], 12);
    }
}
