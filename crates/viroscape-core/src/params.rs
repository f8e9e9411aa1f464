//! Simulation parameters.
//!
//! Loaded once at startup and immutable afterwards. Every table has serde
//! defaults so a partial configuration file is enough; [`SimulationParameters::validate`]
//! must pass before any rank is built.

use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};

/// Width of the buffer zone mirrored to neighbouring ranks, in grid cells.
pub const BUFFER_WIDTH: i32 = 1;

/// Mean and standard deviation of a normally distributed parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalParam {
    pub mean: f64,
    pub std_dev: f64,
}

impl NormalParam {
    pub const fn new(mean: f64, std_dev: f64) -> Self {
        Self { mean, std_dev }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SimulationParameters {
    #[serde(default)]
    pub run: RunParams,
    #[serde(default)]
    pub grid: GridParams,
    /// Totals for the whole grid. Each rank gets `total / ranks`, and the
    /// remainder goes one apiece to the lowest-numbered ranks.
    #[serde(default)]
    pub population: PopulationParams,
    #[serde(default)]
    pub epithelial: EpithelialParams,
    #[serde(default)]
    pub virion: VirionParams,
    #[serde(default)]
    pub innate: InnateParams,
    #[serde(default)]
    pub specialised: SpecialisedParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    /// Last tick to execute.
    #[serde(default = "default_stop_at")]
    pub stop_at: u64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    /// Side length of the square, toroidal grid. The origin sits at `-dimension / 2`.
    #[serde(default = "default_dimension")]
    pub dimension: i32,
    #[serde(default = "default_processes")]
    pub processes_x: i32,
    #[serde(default = "default_processes")]
    pub processes_y: i32,
}

/// Initial counts of the mobile agents, summed over all ranks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationParams {
    #[serde(default = "default_virions")]
    pub virions: usize,
    #[serde(default = "default_innate")]
    pub innate: usize,
    #[serde(default)]
    pub specialised: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpithelialParams {
    #[serde(default = "default_cell_lifespan")]
    pub lifespan: NormalParam,
    #[serde(default = "default_infected_lifespan")]
    pub infected_lifespan: NormalParam,
    #[serde(default = "default_division_rate")]
    pub division_rate: NormalParam,
    #[serde(default = "default_release_delay")]
    pub release_delay: NormalParam,
    #[serde(default = "default_display_delay")]
    pub display_delay: NormalParam,
    #[serde(default = "default_extracellular_release")]
    pub extracellular_release_probability: f64,
    #[serde(default = "default_cell_to_cell")]
    pub cell_to_cell_probability: f64,
    #[serde(default = "default_release_rate")]
    pub virion_release_rate: NormalParam,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirionParams {
    #[serde(default = "default_virion_lifespan")]
    pub lifespan: NormalParam,
    #[serde(default = "default_penetration")]
    pub penetration_probability: f64,
    #[serde(default = "default_clearance")]
    pub clearance_probability: f64,
    /// Multiplier applied to the clearance draw once per co-located immune cell.
    #[serde(default = "default_clearance_scaler")]
    pub clearance_scaler: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InnateParams {
    #[serde(default = "default_innate_lifespan")]
    pub lifespan: NormalParam,
    #[serde(default = "default_innate_recognition")]
    pub recognition_probability: f64,
    #[serde(default = "default_innate_elimination")]
    pub elimination_probability: f64,
    #[serde(default = "default_specialised_recruit_probability")]
    pub specialised_recruit_probability: f64,
    /// Innate cells recruited per detection, when no specialised cell is present.
    #[serde(default = "default_innate_recruit_rate")]
    pub innate_recruit_rate: f64,
    /// Specialised cells recruited by an innate cell per successful recruitment draw.
    #[serde(default = "default_specialised_by_innate_rate")]
    pub specialised_recruit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialisedParams {
    #[serde(default = "default_specialised_lifespan")]
    pub lifespan: NormalParam,
    #[serde(default = "default_specialised_recognition")]
    pub recognition_probability: f64,
    #[serde(default = "default_specialised_elimination")]
    pub elimination_probability: f64,
    #[serde(default = "default_specialised_recruit_rate")]
    pub recruit_rate: f64,
}

fn default_stop_at() -> u64 { 200 }
fn default_seed() -> u64 { 42 }
fn default_dimension() -> i32 { 40 }
fn default_processes() -> i32 { 2 }
fn default_virions() -> usize { 120 }
fn default_innate() -> usize { 24 }
fn default_cell_lifespan() -> NormalParam { NormalParam::new(400.0, 40.0) }
fn default_infected_lifespan() -> NormalParam { NormalParam::new(40.0, 5.0) }
fn default_division_rate() -> NormalParam { NormalParam::new(30.0, 5.0) }
fn default_release_delay() -> NormalParam { NormalParam::new(12.0, 2.0) }
fn default_display_delay() -> NormalParam { NormalParam::new(8.0, 2.0) }
fn default_extracellular_release() -> f64 { 0.6 }
fn default_cell_to_cell() -> f64 { 0.1 }
fn default_release_rate() -> NormalParam { NormalParam::new(1.5, 0.3) }
fn default_virion_lifespan() -> NormalParam { NormalParam::new(20.0, 4.0) }
fn default_penetration() -> f64 { 0.3 }
fn default_clearance() -> f64 { 0.05 }
fn default_clearance_scaler() -> f64 { 1.2 }
fn default_innate_lifespan() -> NormalParam { NormalParam::new(100.0, 10.0) }
fn default_innate_recognition() -> f64 { 0.6 }
fn default_innate_elimination() -> f64 { 0.3 }
fn default_specialised_recruit_probability() -> f64 { 0.2 }
fn default_innate_recruit_rate() -> f64 { 0.5 }
fn default_specialised_by_innate_rate() -> f64 { 0.3 }
fn default_specialised_lifespan() -> NormalParam { NormalParam::new(150.0, 10.0) }
fn default_specialised_recognition() -> f64 { 0.8 }
fn default_specialised_elimination() -> f64 { 0.6 }
fn default_specialised_recruit_rate() -> f64 { 0.4 }

impl Default for RunParams {
    fn default() -> Self {
        Self {
            stop_at: default_stop_at(),
            seed: default_seed(),
        }
    }
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            processes_x: default_processes(),
            processes_y: default_processes(),
        }
    }
}

impl Default for PopulationParams {
    fn default() -> Self {
        Self {
            virions: default_virions(),
            innate: default_innate(),
            specialised: 0,
        }
    }
}

impl Default for EpithelialParams {
    fn default() -> Self {
        Self {
            lifespan: default_cell_lifespan(),
            infected_lifespan: default_infected_lifespan(),
            division_rate: default_division_rate(),
            release_delay: default_release_delay(),
            display_delay: default_display_delay(),
            extracellular_release_probability: default_extracellular_release(),
            cell_to_cell_probability: default_cell_to_cell(),
            virion_release_rate: default_release_rate(),
        }
    }
}

impl Default for VirionParams {
    fn default() -> Self {
        Self {
            lifespan: default_virion_lifespan(),
            penetration_probability: default_penetration(),
            clearance_probability: default_clearance(),
            clearance_scaler: default_clearance_scaler(),
        }
    }
}

impl Default for InnateParams {
    fn default() -> Self {
        Self {
            lifespan: default_innate_lifespan(),
            recognition_probability: default_innate_recognition(),
            elimination_probability: default_innate_elimination(),
            specialised_recruit_probability: default_specialised_recruit_probability(),
            innate_recruit_rate: default_innate_recruit_rate(),
            specialised_recruit_rate: default_specialised_by_innate_rate(),
        }
    }
}

impl Default for SpecialisedParams {
    fn default() -> Self {
        Self {
            lifespan: default_specialised_lifespan(),
            recognition_probability: default_specialised_recognition(),
            elimination_probability: default_specialised_elimination(),
            recruit_rate: default_specialised_recruit_rate(),
        }
    }
}

impl SimulationParameters {
    /// Number of ranks implied by the process topology.
    pub fn rank_count(&self) -> usize {
        (self.grid.processes_x.max(0) * self.grid.processes_y.max(0)) as usize
    }

    /// Reject a configuration that cannot start.
    ///
    /// Durations are drawn from normals and redrawn while below one step, so
    /// their means must reach that floor or the redraw would never settle.
    pub fn validate(&self) -> SimResult<()> {
        let grid = &self.grid;
        if grid.dimension <= 0 {
            return Err(SimError::invalid_config("grid.dimension", "must be positive"));
        }
        for (field, count) in [
            ("grid.processes_x", grid.processes_x),
            ("grid.processes_y", grid.processes_y),
        ] {
            if count <= 0 {
                return Err(SimError::invalid_config(field, "must be positive"));
            }
            if grid.dimension % count != 0 {
                return Err(SimError::invalid_config(
                    field,
                    format!("{} does not divide grid dimension {}", count, grid.dimension),
                ));
            }
            if grid.dimension / count < BUFFER_WIDTH {
                return Err(SimError::invalid_config(
                    field,
                    "partitions would be narrower than the buffer zone",
                ));
            }
        }

        let durations = [
            ("epithelial.lifespan", self.epithelial.lifespan, 1.0),
            ("epithelial.infected_lifespan", self.epithelial.infected_lifespan, 1.0),
            ("epithelial.division_rate", self.epithelial.division_rate, 1.0),
            ("epithelial.release_delay", self.epithelial.release_delay, 1.0),
            ("epithelial.display_delay", self.epithelial.display_delay, 1.0),
            ("epithelial.virion_release_rate", self.epithelial.virion_release_rate, 0.1),
            ("virion.lifespan", self.virion.lifespan, 1.0),
            ("innate.lifespan", self.innate.lifespan, 1.0),
            ("specialised.lifespan", self.specialised.lifespan, 1.0),
        ];
        for (field, param, floor) in durations {
            check_normal(field, param, floor)?;
        }

        let probabilities = [
            (
                "epithelial.extracellular_release_probability",
                self.epithelial.extracellular_release_probability,
            ),
            (
                "epithelial.cell_to_cell_probability",
                self.epithelial.cell_to_cell_probability,
            ),
            ("virion.penetration_probability", self.virion.penetration_probability),
            ("virion.clearance_probability", self.virion.clearance_probability),
            ("innate.recognition_probability", self.innate.recognition_probability),
            ("innate.elimination_probability", self.innate.elimination_probability),
            (
                "innate.specialised_recruit_probability",
                self.innate.specialised_recruit_probability,
            ),
            (
                "specialised.recognition_probability",
                self.specialised.recognition_probability,
            ),
            (
                "specialised.elimination_probability",
                self.specialised.elimination_probability,
            ),
        ];
        for (field, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimError::invalid_config(
                    field,
                    format!("{} is not a probability", value),
                ));
            }
        }

        let rates = [
            ("virion.clearance_scaler", self.virion.clearance_scaler),
            ("innate.innate_recruit_rate", self.innate.innate_recruit_rate),
            ("innate.specialised_recruit_rate", self.innate.specialised_recruit_rate),
            ("specialised.recruit_rate", self.specialised.recruit_rate),
        ];
        for (field, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::invalid_config(
                    field,
                    format!("{} must be a non-negative number", value),
                ));
            }
        }

        Ok(())
    }
}

fn check_normal(field: &str, param: NormalParam, floor: f64) -> SimResult<()> {
    if !param.mean.is_finite() || param.mean < floor {
        return Err(SimError::invalid_config(
            format!("{}.mean", field),
            format!("{} is below the minimum of {}", param.mean, floor),
        ));
    }
    if !param.std_dev.is_finite() || param.std_dev < 0.0 {
        return Err(SimError::invalid_config(
            format!("{}.std_dev", field),
            "must be non-negative",
        ));
    }
    Ok(())
}
