//! Package receiver: wire record to live agent.

use super::{AgentPackage, KindFields};
use viroscape_core::{
    Agent, AgentId, AgentKind, EpithelialCell, InnateImmuneCell, NeighborMutation, RateCarry,
    SimError, SimResult, SpecialisedImmuneCell, Virion, Vitals,
};

/// Mutable access to any agent a rank holds, owned or replicated.
pub trait AgentSink {
    fn resolve_mut(&mut self, id: &AgentId) -> Option<&mut Agent>;
}

/// Build a fresh agent from `package`.
///
/// # Errors
///
/// [`SimError::UnknownKind`] for a kind discriminator outside `0..=3`, and a
/// consistency violation when the kind-specific fields belong to another kind.
pub fn create(package: &AgentPackage) -> SimResult<Agent> {
    let id = package.agent_id()?;
    let vitals = Vitals::new(package.age, package.lifespan);

    let agent = match (id.kind, &package.fields) {
        (
            AgentKind::Epithelial,
            KindFields::Epithelial {
                internal,
                external,
                time_infected,
                infected_lifespan,
                time_since_division,
                division_rate,
                release_delay,
                display_delay,
                extracellular_release_probability,
                cell_to_cell_probability,
                virion_release_rate,
                virions_to_release,
                release_remainder,
            },
        ) => {
            let pending = package
                .mutation
                .as_ref()
                .map(NeighborMutation::try_from)
                .transpose()?;
            Agent::Epithelial(EpithelialCell {
                id,
                vitals,
                internal: *internal,
                external: *external,
                time_infected: *time_infected,
                infected_lifespan: *infected_lifespan,
                time_since_division: *time_since_division,
                division_rate: *division_rate,
                release_delay: *release_delay,
                display_delay: *display_delay,
                extracellular_release_probability: *extracellular_release_probability,
                cell_to_cell_probability: *cell_to_cell_probability,
                release: RateCarry {
                    rate: *virion_release_rate,
                    pending: *virions_to_release,
                    remainder: *release_remainder,
                },
                pending,
            })
        }
        (
            AgentKind::Virion,
            KindFields::Virion {
                state,
                penetration_probability,
                clearance_probability,
                clearance_scaler,
            },
        ) => Agent::Virion(Virion {
            id,
            vitals,
            state: *state,
            penetration_probability: *penetration_probability,
            clearance_probability: *clearance_probability,
            clearance_scaler: *clearance_scaler,
        }),
        (
            AgentKind::Innate,
            KindFields::Innate {
                state,
                recognition_probability,
                elimination_probability,
                specialised_recruit_probability,
                specialised_recruit_rate,
                specialised_to_recruit,
                specialised_remainder,
                innate_recruit_rate,
                innate_to_recruit,
                innate_remainder,
            },
        ) => Agent::Innate(InnateImmuneCell {
            id,
            vitals,
            state: *state,
            recognition_probability: *recognition_probability,
            elimination_probability: *elimination_probability,
            specialised_recruit_probability: *specialised_recruit_probability,
            specialised_recruit: RateCarry {
                rate: *specialised_recruit_rate,
                pending: *specialised_to_recruit,
                remainder: *specialised_remainder,
            },
            innate_recruit: RateCarry {
                rate: *innate_recruit_rate,
                pending: *innate_to_recruit,
                remainder: *innate_remainder,
            },
        }),
        (
            AgentKind::Specialised,
            KindFields::Specialised {
                state,
                recognition_probability,
                elimination_probability,
                recruit_rate,
                to_recruit,
                recruit_remainder,
            },
        ) => Agent::Specialised(SpecialisedImmuneCell {
            id,
            vitals,
            state: *state,
            recognition_probability: *recognition_probability,
            elimination_probability: *elimination_probability,
            recruit: RateCarry {
                rate: *recruit_rate,
                pending: *to_recruit,
                remainder: *recruit_remainder,
            },
        }),
        (kind, fields) => {
            return Err(SimError::consistency(
                id,
                format!("{} fields", kind),
                format!("{} fields", fields.kind()),
            ))
        }
    };

    Ok(agent)
}

/// Overwrite every field of `agent` with the contents of `package`.
///
/// The package must describe the same logical agent.
pub fn apply(agent: &mut Agent, package: &AgentPackage) -> SimResult<()> {
    let incoming = create(package)?;
    let current = agent.id();
    if current != incoming.id() {
        return Err(SimError::consistency(
            current,
            current.to_string(),
            incoming.id().to_string(),
        ));
    }
    *agent = incoming;
    Ok(())
}

/// Refresh the agent `package` describes, wherever the sink holds it.
///
/// Returns the refreshed identity. Fails with [`SimError::AgentNotFound`] if
/// the sink holds no agent with that logical identity.
pub fn update<S: AgentSink + ?Sized>(sink: &mut S, package: &AgentPackage) -> SimResult<AgentId> {
    let id = package.agent_id()?;
    let agent = sink.resolve_mut(&id).ok_or(SimError::AgentNotFound(id))?;
    apply(agent, package)?;
    Ok(id)
}
