//! Package provider: live agent to wire record.

use super::{AgentPackage, KindFields, MutationFields};
use viroscape_core::{Agent, AgentId, SimError, SimResult};

/// Read access to the agents a rank owns.
pub trait AgentSource {
    fn owned(&self, id: &AgentId) -> Option<&Agent>;
}

/// Capture every field needed to rebuild `agent` exactly.
pub fn provide(agent: &Agent) -> AgentPackage {
    let id = agent.id();
    let vitals = agent.vitals();

    let (fields, mutation) = match agent {
        Agent::Epithelial(cell) => (
            KindFields::Epithelial {
                internal: cell.internal,
                external: cell.external,
                time_infected: cell.time_infected,
                infected_lifespan: cell.infected_lifespan,
                time_since_division: cell.time_since_division,
                division_rate: cell.division_rate,
                release_delay: cell.release_delay,
                display_delay: cell.display_delay,
                extracellular_release_probability: cell.extracellular_release_probability,
                cell_to_cell_probability: cell.cell_to_cell_probability,
                virion_release_rate: cell.release.rate,
                virions_to_release: cell.release.pending,
                release_remainder: cell.release.remainder,
            },
            cell.pending.as_ref().map(MutationFields::from),
        ),
        Agent::Virion(virion) => (
            KindFields::Virion {
                state: virion.state,
                penetration_probability: virion.penetration_probability,
                clearance_probability: virion.clearance_probability,
                clearance_scaler: virion.clearance_scaler,
            },
            None,
        ),
        Agent::Innate(cell) => (
            KindFields::Innate {
                state: cell.state,
                recognition_probability: cell.recognition_probability,
                elimination_probability: cell.elimination_probability,
                specialised_recruit_probability: cell.specialised_recruit_probability,
                specialised_recruit_rate: cell.specialised_recruit.rate,
                specialised_to_recruit: cell.specialised_recruit.pending,
                specialised_remainder: cell.specialised_recruit.remainder,
                innate_recruit_rate: cell.innate_recruit.rate,
                innate_to_recruit: cell.innate_recruit.pending,
                innate_remainder: cell.innate_recruit.remainder,
            },
            None,
        ),
        Agent::Specialised(cell) => (
            KindFields::Specialised {
                state: cell.state,
                recognition_probability: cell.recognition_probability,
                elimination_probability: cell.elimination_probability,
                recruit_rate: cell.recruit.rate,
                to_recruit: cell.recruit.pending,
                recruit_remainder: cell.recruit.remainder,
            },
            None,
        ),
    };

    AgentPackage {
        id: id.seq,
        starting_rank: id.starting_rank.as_i32(),
        kind: id.kind.discriminant(),
        current_rank: id.current_rank.as_i32(),
        lifespan: vitals.lifespan,
        age: vitals.age,
        fields,
        mutation,
    }
}

/// Packages for a batch of owned agents.
///
/// # Errors
///
/// Fails with [`SimError::AgentNotFound`] on the first id the source does not
/// own. A peer asked for an agent this rank does not have, so the ranks have
/// diverged.
pub fn provide_many<S: AgentSource + ?Sized>(source: &S, ids: &[AgentId]) -> SimResult<Vec<AgentPackage>> {
    ids.iter()
        .map(|id| source.owned(id).map(provide).ok_or(SimError::AgentNotFound(*id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use viroscape_core::*;

    struct Owned(BTreeMap<AgentId, Agent>);

    impl AgentSource for Owned {
        fn owned(&self, id: &AgentId) -> Option<&Agent> {
            self.0.get(id)
        }
    }

    fn virion(seq: i32) -> Agent {
        Agent::Virion(Virion::new(
            AgentId::new(seq, RankId::new(0), AgentKind::Virion),
            Vitals::new(seq as u32, 30),
            0.2,
            0.1,
            1.3,
        ))
    }

    #[test]
    fn test_provide_epithelial_with_mutation() {
        let target = AgentId::new(4, RankId::new(1), AgentKind::Epithelial);
        let mut cell = EpithelialCell::healthy(
            AgentId::new(3, RankId::new(0), AgentKind::Epithelial),
            Vitals::new(5, 90),
        );
        cell.release = RateCarry { rate: 1.7, pending: 2, remainder: 0.1 + 0.2 };
        cell.pending = Some(NeighborMutation::divide_into(target));

        let package = provide(&Agent::Epithelial(cell));
        assert_eq!(package.kind, 0);
        assert_eq!((package.age, package.lifespan), (5, 90));
        let mutation = package.mutation.unwrap();
        assert_eq!(mutation.kind, MutationKind::DivideInto);
        assert_eq!(mutation.target_id, 4);
        assert_eq!(mutation.target_starting_rank, 1);
        match package.fields {
            KindFields::Epithelial { release_remainder, virions_to_release, .. } => {
                assert_eq!(release_remainder.to_bits(), (0.1f64 + 0.2).to_bits());
                assert_eq!(virions_to_release, 2);
            }
            other => panic!("unexpected fields {:?}", other),
        }
    }

    #[test]
    fn test_provide_many_in_request_order() {
        let mut map = BTreeMap::new();
        for seq in 0..3 {
            let agent = virion(seq);
            map.insert(agent.id(), agent);
        }
        let source = Owned(map);
        let ids = vec![
            AgentId::new(2, RankId::new(0), AgentKind::Virion),
            AgentId::new(0, RankId::new(0), AgentKind::Virion),
        ];
        let packages = provide_many(&source, &ids).unwrap();
        assert_eq!(packages.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 0]);
    }

    #[test]
    fn test_provide_many_fails_on_missing() {
        let source = Owned(BTreeMap::new());
        let missing = AgentId::new(8, RankId::new(0), AgentKind::Innate);
        assert_eq!(
            provide_many(&source, &[missing]),
            Err(SimError::AgentNotFound(missing))
        );
    }
}
