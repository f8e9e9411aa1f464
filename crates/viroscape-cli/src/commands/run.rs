//! Run the simulation on an in-process cluster of ranks.

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use viroscape_core::{Census, SimulationParameters};
use viroscape_distributed::{DistributedRunner, RunnerConfig};

use crate::config::Config;
use crate::output::{CensusWriter, OutputFormat};

/// Command-line overrides for a run.
pub struct RunOptions {
    pub ticks: Option<u64>,
    pub ranks_x: Option<i32>,
    pub ranks_y: Option<i32>,
    pub seed: Option<u64>,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
}

impl RunOptions {
    fn apply(&self, params: &mut SimulationParameters) {
        if let Some(x) = self.ranks_x {
            params.grid.processes_x = x;
        }
        if let Some(y) = self.ranks_y {
            params.grid.processes_y = y;
        }
        if let Some(seed) = self.seed {
            params.run.seed = seed;
        }
    }
}

/// Totals accumulated over a run.
#[derive(Debug, Default)]
struct RunTotals {
    transferred: usize,
    refreshed: usize,
    isolated_failures: usize,
}

pub fn run(config_path: Option<&Path>, options: RunOptions) -> Result<()> {
    let mut config = Config::load(config_path)?;
    options.apply(&mut config.params);
    config.params.validate().context("Invalid configuration")?;

    let params = config.params;
    let ticks = options.ticks.unwrap_or(params.run.stop_at);

    let sink: Box<dyn Write> = match &options.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = CensusWriter::new(options.format, sink)?;

    eprintln!(
        "{} {}x{} grid on {} ranks ({}x{}), seed {}",
        "→".blue(),
        params.grid.dimension,
        params.grid.dimension,
        params.rank_count().to_string().cyan(),
        params.grid.processes_x,
        params.grid.processes_y,
        params.run.seed
    );

    // Census rows go to stdout when no file is given, so the bar only
    // shows when writing to a file.
    let pb = if options.output.is_some() {
        let pb = ProgressBar::new(ticks);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ticks")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let rt = tokio::runtime::Runtime::new()?;
    let (initial, last, totals) = rt.block_on(async {
        let runner = DistributedRunner::from_params(params, RunnerConfig::default())
            .await
            .context("Failed to build the cluster")?;

        let initial = runner.census().await;
        writer.write(0, &initial)?;

        let mut totals = RunTotals::default();
        for _ in 0..ticks {
            let report = runner
                .tick()
                .await
                .with_context(|| format!("Tick {} failed", runner.coordinator().current_tick() + 1))?;
            writer.write(report.tick, &report.census)?;
            totals.transferred += report.transferred();
            totals.refreshed += report.refreshed();
            totals.isolated_failures += report.isolated_failures();
            pb.inc(1);
        }

        let last = runner.finalize().await;
        Ok::<_, anyhow::Error>((initial, last, totals))
    })?;
    pb.finish_and_clear();
    writer.finish()?;

    print_summary(ticks, &initial, &last, &totals, options.output.as_deref());
    Ok(())
}

fn print_summary(ticks: u64, initial: &Census, last: &Census, totals: &RunTotals, output: Option<&Path>) {
    eprintln!();
    eprintln!("{} Simulation complete after {} ticks", "✓".green().bold(), ticks);
    eprintln!(
        "  Healthy cells:   {} → {}",
        initial.healthy_cells.to_string().yellow(),
        last.healthy_cells.to_string().green()
    );
    eprintln!(
        "  Alive cells:     {} → {}",
        initial.alive_epithelial().to_string().yellow(),
        last.alive_epithelial().to_string().green()
    );
    eprintln!(
        "  Infected cells:  {} → {}",
        initial.infected_cells.to_string().yellow(),
        last.infected_cells.to_string().red()
    );
    eprintln!(
        "  Dead cells:      {} → {}",
        initial.dead_cells.to_string().yellow(),
        last.dead_cells.to_string().red()
    );
    eprintln!(
        "  Free virions:    {} → {}",
        initial.free_virions.to_string().yellow(),
        last.free_virions.to_string().cyan()
    );
    eprintln!(
        "  Immune cells:    {} innate, {} specialised",
        last.innate_cells.to_string().cyan(),
        last.specialised_cells.to_string().cyan()
    );
    eprintln!(
        "  Cross-rank:      {} transferred, {} replicas refreshed",
        totals.transferred, totals.refreshed
    );
    if totals.isolated_failures > 0 {
        eprintln!(
            "  {} {} agent updates failed and were skipped (run with -v for details)",
            "!".yellow().bold(),
            totals.isolated_failures
        );
    }
    if let Some(path) = output {
        eprintln!("  Census written to {}", path.display().to_string().cyan());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_applied() {
        let options = RunOptions {
            ticks: Some(3),
            ranks_x: Some(4),
            ranks_y: None,
            seed: Some(17),
            format: OutputFormat::Json,
            output: None,
        };
        let mut params = SimulationParameters::default();
        let default_y = params.grid.processes_y;
        options.apply(&mut params);
        assert_eq!(params.grid.processes_x, 4);
        assert_eq!(params.grid.processes_y, default_y);
        assert_eq!(params.run.seed, 17);
    }

    #[test]
    fn test_run_writes_census_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("small.toml");
        let mut config = Config::default();
        config.params.grid.dimension = 8;
        config.params.grid.processes_x = 2;
        config.params.grid.processes_y = 1;
        config.params.population.virions = 10;
        config.params.population.innate = 2;
        config.params.population.specialised = 0;
        config.save(&config_path).unwrap();

        let output = dir.path().join("census.csv");
        run(
            Some(&config_path),
            RunOptions {
                ticks: Some(4),
                ranks_x: None,
                ranks_y: None,
                seed: Some(5),
                format: OutputFormat::Csv,
                output: Some(output.clone()),
            },
        )
        .unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], Census::csv_header());
        assert!(lines[1].starts_with("0,"));
        assert!(lines[5].starts_with("4,"));
    }

    #[test]
    fn test_invalid_topology_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("bad.toml");
        std::fs::write(&config_path, "[grid]\ndimension = 10\nprocesses_x = 3\n").unwrap();

        let result = run(
            Some(&config_path),
            RunOptions {
                ticks: Some(1),
                ranks_x: None,
                ranks_y: None,
                seed: None,
                format: OutputFormat::Csv,
                output: Some(dir.path().join("never.csv")),
            },
        );
        assert!(result.is_err());
    }
}
