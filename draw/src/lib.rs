//! Secret friend assignment
//!
//! The draw takes a set of participants and arranges them into a single cycle: every participant
//! gifts the next one, and the last one gifts the first. With at least two participants nobody
//! ever gets themselves, and everybody is picked as a friend exactly once.

use std::collections::HashSet;
use std::hash::Hash;

use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("No participants to draw")]
    NoParticipants,
    #[error("At least two participants are needed for a draw")]
    InsufficientParticipants,
    #[error("Participant listed more than once")]
    DuplicateParticipant,
}

/// Smallest group that can be drawn without anybody getting themselves
pub const MIN_PARTICIPANTS: usize = 2;

/// Single entry of the draw result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Assignment<T> {
    /// Participant buying the gift
    pub giver: T,
    /// Secret friend of the `giver`
    pub friend: T,
}

/// Assignment engine with an injected random source.
///
/// The engine keeps no state between draws besides the random generator, so the same engine can
/// be reused for any number of independent draws.
#[derive(Debug, Clone)]
pub struct Engine<R> {
    rng: R,
}

impl<R: Rng> Engine<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Draws secret friends for given participants.
    ///
    /// Returned assignments are in the shuffled order: the friend of every entry is the giver of
    /// the next one, wrapping around at the end.
    pub fn draw<T>(&mut self, mut participants: Vec<T>) -> Result<Vec<Assignment<T>>, Error>
    where
        T: Clone + Eq + Hash,
    {
        match participants.len() {
            0 => return Err(Error::NoParticipants),
            n if n < MIN_PARTICIPANTS => return Err(Error::InsufficientParticipants),
            _ => (),
        }

        let mut seen = HashSet::with_capacity(participants.len());
        if !participants.iter().all(|p| seen.insert(p)) {
            return Err(Error::DuplicateParticipant);
        }

        participants.shuffle(&mut self.rng);

        let assignments: Vec<_> = participants
            .iter()
            .zip(participants.iter().cycle().skip(1))
            .map(|(giver, friend)| Assignment {
                giver: giver.clone(),
                friend: friend.clone(),
            })
            .collect();

        debug_assert!(is_derangement(&participants, &assignments));
        debug!(participants = assignments.len(), "Drawn secret friends");

        Ok(assignments)
    }
}

/// Draws secret friends using the thread-local random generator
pub fn draw<T>(participants: Vec<T>) -> Result<Vec<Assignment<T>>, Error>
where
    T: Clone + Eq + Hash,
{
    Engine::new(rand::thread_rng()).draw(participants)
}

/// Checks if `assignments` is a permutation of `participants` without fixed points
pub fn is_derangement<T>(participants: &[T], assignments: &[Assignment<T>]) -> bool
where
    T: Eq + Hash,
{
    if participants.len() != assignments.len() {
        return false;
    }

    let expected: HashSet<&T> = participants.iter().collect();
    let givers: HashSet<&T> = assignments.iter().map(|a| &a.giver).collect();
    let friends: HashSet<&T> = assignments.iter().map(|a| &a.friend).collect();

    expected.len() == participants.len()
        && givers == expected
        && friends == expected
        && assignments.iter().all(|a| a.giver != a.friend)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn engine(seed: u64) -> Engine<StdRng> {
        Engine::new(StdRng::seed_from_u64(seed))
    }

    /// Follows the assignments starting from `start` until coming back, returning the cycle length
    fn cycle_len<T: Eq + Hash + Clone>(assignments: &[Assignment<T>], start: &T) -> usize {
        let next: HashMap<_, _> = assignments
            .iter()
            .map(|a| (a.giver.clone(), a.friend.clone()))
            .collect();

        let mut current = next[start].clone();
        let mut len = 1;
        while &current != start {
            current = next[&current].clone();
            len += 1;
        }
        len
    }

    #[test]
    fn empty_draw_fails() {
        let err = engine(0).draw(Vec::<i64>::new()).unwrap_err();
        assert_eq!(err, Error::NoParticipants);
    }

    #[test]
    fn single_participant_fails() {
        let err = engine(0).draw(vec![7]).unwrap_err();
        assert_eq!(err, Error::InsufficientParticipants);
    }

    #[test]
    fn duplicated_participant_fails() {
        let err = engine(0).draw(vec![1, 2, 3, 2]).unwrap_err();
        assert_eq!(err, Error::DuplicateParticipant);
    }

    #[test]
    fn two_participants_gift_each_other() {
        let assignments = engine(1).draw(vec![1, 2]).unwrap();
        let pairs: HashSet<_> = assignments.iter().map(|a| (a.giver, a.friend)).collect();
        assert_eq!(pairs, HashSet::from([(1, 2), (2, 1)]));
    }

    #[test]
    fn draws_are_derangements() {
        let mut engine = engine(42);
        for n in 2..=50 {
            let participants: Vec<i64> = (1..=n).collect();
            let assignments = engine.draw(participants.clone()).unwrap();

            assert!(is_derangement(&participants, &assignments), "n = {n}");
            assert_eq!(cycle_len(&assignments, &1), n as usize, "n = {n}");
        }
    }

    #[test]
    fn four_participants_form_single_cycle() {
        let participants = vec!["A", "B", "C", "D"];
        let assignments = engine(2024).draw(participants.clone()).unwrap();

        assert_eq!(assignments.len(), 4);
        assert!(is_derangement(&participants, &assignments));
        for p in &participants {
            assert_eq!(cycle_len(&assignments, p), 4);
        }

        // Output is chained: every friend is the next giver
        for (current, next) in assignments.iter().zip(assignments.iter().cycle().skip(1)) {
            assert_eq!(current.friend, next.giver);
        }
    }

    #[test]
    fn same_seed_same_draw() {
        let participants: Vec<i64> = (1..=10).collect();
        let first = engine(5).draw(participants.clone()).unwrap();
        let second = engine(5).draw(participants).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn draws_are_uniform_over_cycles() {
        const RUNS: usize = 1000;

        let mut engine = engine(7);
        let participants = vec![1, 2, 3, 4, 5];

        let mut counts: HashMap<BTreeMap<i32, i32>, usize> = HashMap::new();
        for _ in 0..RUNS {
            let cycle = engine
                .draw(participants.clone())
                .unwrap()
                .into_iter()
                .map(|a| (a.giver, a.friend))
                .collect();
            *counts.entry(cycle).or_default() += 1;
        }

        // There are (n - 1)! = 24 distinct cycles over five participants, each expected about
        // 1000 / 24 ~ 42 times.
        assert_eq!(counts.len(), 24);
        assert!(counts.values().all(|&count| (10..=100).contains(&count)), "{counts:?}");
    }

    #[test]
    fn derangement_check_rejects_fixed_points() {
        let participants = vec![1, 2, 3];
        let assignments = vec![
            Assignment { giver: 1, friend: 2 },
            Assignment { giver: 2, friend: 1 },
            Assignment { giver: 3, friend: 3 },
        ];
        assert!(!is_derangement(&participants, &assignments));
    }

    #[test]
    fn derangement_check_rejects_double_friend() {
        let participants = vec![1, 2, 3];
        let assignments = vec![
            Assignment { giver: 1, friend: 2 },
            Assignment { giver: 2, friend: 3 },
            Assignment { giver: 3, friend: 2 },
        ];
        assert!(!is_derangement(&participants, &assignments));
    }

    #[test]
    fn thread_rng_draw() {
        let participants: Vec<i64> = (1..=6).collect();
        let assignments = draw(participants.clone()).unwrap();
        assert!(is_derangement(&participants, &assignments));
    }
}
