//! Keyed children reconciler.
//!
//! Given the old and new key sequences of a keyed element, decide for every
//! new position whether it reuses an old child in place, moves an old child,
//! or needs a fresh node, and which old children go away.
//!
//! The plan is computed on keys alone. The diff engine turns it into
//! patches and the morph engine turns it into direct mutations, so both
//! agree on every reuse decision, duplicates included.
//!
//! Strategy:
//! 1. Scan from the front while keys match, with a one-step lookahead that
//!    recognizes a single insertion, a single removal and a two-element swap.
//! 2. Scan from the back the same way.
//! 3. Whatever neither scan resolves goes through a key map.
//!
//! Removals and insertions found during the scans are tentative: an old
//! child removed at one place and a new child with the same key inserted
//! elsewhere pair up into a move.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::ops::Range;

use tracing::{trace, warn};

/// Appended to a key whose earlier occurrence is already pending.
const DUPLICATE_SUFFIX: &str = "\u{1f}dup";

/// Membership test over the full key set of one side.
pub trait KeySet {
    fn has(&self, key: &str) -> bool;
}

impl<T: Borrow<str> + Eq + Hash> KeySet for HashSet<T> {
    fn has(&self, key: &str) -> bool {
        self.contains(key)
    }
}

/// What fills a new position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Old child `i` is reconciled where it already is.
    Keep(usize),
    /// Old child `i` is reconciled and moved here.
    Move(usize),
    /// A fresh node is rendered.
    Create,
}

/// What happens to an old child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Keep(usize),
    Move(usize),
    Removed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyedStats {
    pub kept: usize,
    pub moved: usize,
    pub created: usize,
    pub removed: usize,
    pub swaps: usize,
    pub used_map: bool,
}

#[derive(Debug, Clone)]
pub struct KeyedPlan {
    /// One step per new child.
    pub steps: Vec<Step>,
    /// One role per old child.
    pub roles: Vec<Role>,
    /// Old indexes with [`Role::Removed`], ascending.
    pub removed: Vec<usize>,
    pub stats: KeyedStats,
}

impl KeyedPlan {
    /// First new index after the last kept child. Every position from here
    /// on can be filled by appending.
    pub fn tail_start(&self) -> usize {
        self.steps
            .iter()
            .rposition(|s| matches!(s, Step::Keep(_)))
            .map_or(0, |at| at + 1)
    }
}

/// Reconcile two key sequences. `old_keys` and `new_keys` must hold every
/// key of `old` and `new`.
pub fn reconcile<O, N>(old: &[&str], new: &[&str], old_keys: &O, new_keys: &N) -> KeyedPlan
where
    O: KeySet + ?Sized,
    N: KeySet + ?Sized,
{
    let mut planner = Planner {
        old,
        new,
        old_keys,
        new_keys,
        steps: vec![None; new.len()],
        roles: vec![None; old.len()],
        pending: HashMap::new(),
        stats: KeyedStats::default(),
    };
    planner.run();
    planner.finish()
}

/// [`reconcile`] with the key sets built from the sequences.
pub fn reconcile_keys(old: &[&str], new: &[&str]) -> KeyedPlan {
    let old_keys: HashSet<&str> = old.iter().copied().collect();
    let new_keys: HashSet<&str> = new.iter().copied().collect();
    reconcile(old, new, &old_keys, &new_keys)
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Insert(usize),
    Remove(usize),
    Paired,
}

struct Planner<'a, O: ?Sized, N: ?Sized> {
    old: &'a [&'a str],
    new: &'a [&'a str],
    old_keys: &'a O,
    new_keys: &'a N,
    steps: Vec<Option<Step>>,
    roles: Vec<Option<Role>>,
    pending: HashMap<String, Pending>,
    stats: KeyedStats,
}

impl<O: KeySet + ?Sized, N: KeySet + ?Sized> Planner<'_, O, N> {
    fn run(&mut self) {
        let mut old = 0..self.old.len();
        let mut new = 0..self.new.len();

        while !old.is_empty() && !new.is_empty() && self.front(&mut old, &mut new) {}
        while !old.is_empty() && !new.is_empty() && self.back(&mut old, &mut new) {}

        if !old.is_empty() && !new.is_empty() {
            self.map_region(old, new);
            return;
        }
        for i in old {
            self.tentative_remove(i);
        }
        for j in new {
            self.tentative_insert(j);
        }
    }

    /// One step of the front scan. Returns false when stuck.
    fn front(&mut self, old: &mut Range<usize>, new: &mut Range<usize>) -> bool {
        let (i, j) = (old.start, new.start);
        let (ok, nk) = (self.old[i], self.new[j]);

        if ok == nk {
            self.keep(i, j);
            old.start += 1;
            new.start += 1;
            return true;
        }
        if !self.new_keys.has(ok) {
            self.tentative_remove(i);
            old.start += 1;
            return true;
        }
        if !self.old_keys.has(nk) {
            self.tentative_insert(j);
            new.start += 1;
            return true;
        }

        let old_next = (i + 1 < old.end).then(|| self.old[i + 1]);
        let new_next = (j + 1 < new.end).then(|| self.new[j + 1]);
        match (old_next == Some(nk), new_next == Some(ok)) {
            (true, true) => {
                trace!(old = i, new = j, "keyed swap");
                self.stats.swaps += 1;
                self.keep(i + 1, j);
                self.relocate(i, j + 1);
                old.start += 2;
                new.start += 2;
            }
            (false, true) => {
                self.tentative_insert(j);
                new.start += 1;
            }
            (true, false) => {
                self.tentative_remove(i);
                old.start += 1;
            }
            (false, false) => return false,
        }
        true
    }

    /// Mirror of [`Self::front`] working from the ends.
    fn back(&mut self, old: &mut Range<usize>, new: &mut Range<usize>) -> bool {
        let (i, j) = (old.end - 1, new.end - 1);
        let (ok, nk) = (self.old[i], self.new[j]);

        if ok == nk {
            self.keep(i, j);
            old.end -= 1;
            new.end -= 1;
            return true;
        }
        if !self.new_keys.has(ok) {
            self.tentative_remove(i);
            old.end -= 1;
            return true;
        }
        if !self.old_keys.has(nk) {
            self.tentative_insert(j);
            new.end -= 1;
            return true;
        }

        let old_prev = (i > old.start).then(|| self.old[i - 1]);
        let new_prev = (j > new.start).then(|| self.new[j - 1]);
        match (old_prev == Some(nk), new_prev == Some(ok)) {
            (true, true) => {
                trace!(old = i, new = j, "keyed swap");
                self.stats.swaps += 1;
                self.keep(i, j - 1);
                self.relocate(i - 1, j);
                old.end -= 2;
                new.end -= 2;
            }
            (false, true) => {
                self.tentative_insert(j);
                new.end -= 1;
            }
            (true, false) => {
                self.tentative_remove(i);
                old.end -= 1;
            }
            (false, false) => return false,
        }
        true
    }

    /// Resolve an arbitrary permutation. Reused children are kept when they
    /// are already at the insertion cursor and moved otherwise.
    fn map_region(&mut self, old: Range<usize>, new: Range<usize>) {
        trace!(old = ?old, new = ?new, "keyed map fallback");
        self.stats.used_map = true;

        let mut by_key: HashMap<&str, usize> = HashMap::new();
        for i in old.clone() {
            let key = self.old[i];
            let waiting_insert = matches!(self.pending.get(key), Some(Pending::Insert(_)));
            if by_key.contains_key(key) || waiting_insert {
                self.tentative_remove(i);
            } else {
                by_key.insert(key, i);
            }
        }

        let mut reused = Vec::new();
        for j in new {
            match by_key.remove(self.new[j]) {
                Some(i) => reused.push((i, j)),
                None => self.tentative_insert(j),
            }
        }
        let mut leftover: Vec<usize> = by_key.into_values().collect();
        leftover.sort_unstable();
        for i in leftover {
            self.tentative_remove(i);
        }

        let base = old.start;
        let mut candidate = vec![false; old.len()];
        for &(i, _) in &reused {
            candidate[i - base] = true;
        }
        let mut cursor = base;
        for (i, j) in reused {
            while cursor < old.end && !candidate[cursor - base] {
                cursor += 1;
            }
            candidate[i - base] = false;
            if i == cursor {
                self.keep(i, j);
                cursor += 1;
            } else {
                self.relocate(i, j);
            }
        }
    }

    fn keep(&mut self, i: usize, j: usize) {
        self.steps[j] = Some(Step::Keep(i));
        self.roles[i] = Some(Role::Keep(j));
        self.stats.kept += 1;
    }

    fn relocate(&mut self, i: usize, j: usize) {
        self.steps[j] = Some(Step::Move(i));
        self.roles[i] = Some(Role::Move(j));
        self.stats.moved += 1;
    }

    fn tentative_insert(&mut self, j: usize) {
        let mut key = self.new[j].to_owned();
        loop {
            match self.pending.get(&key).copied() {
                None => {
                    self.pending.insert(key, Pending::Insert(j));
                    return;
                }
                Some(Pending::Remove(i)) => {
                    self.pending.insert(key, Pending::Paired);
                    self.relocate(i, j);
                    return;
                }
                Some(_) => {
                    warn!(key = self.new[j], "duplicate key in new keyed children");
                    key.push_str(DUPLICATE_SUFFIX);
                }
            }
        }
    }

    fn tentative_remove(&mut self, i: usize) {
        let mut key = self.old[i].to_owned();
        loop {
            match self.pending.get(&key).copied() {
                None => {
                    self.pending.insert(key, Pending::Remove(i));
                    return;
                }
                Some(Pending::Insert(j)) => {
                    self.pending.insert(key, Pending::Paired);
                    self.relocate(i, j);
                    return;
                }
                Some(_) => {
                    warn!(key = self.old[i], "duplicate key in old keyed children");
                    key.push_str(DUPLICATE_SUFFIX);
                }
            }
        }
    }

    fn finish(mut self) -> KeyedPlan {
        for pending in std::mem::take(&mut self.pending).into_values() {
            match pending {
                Pending::Insert(j) => {
                    self.steps[j] = Some(Step::Create);
                    self.stats.created += 1;
                }
                Pending::Remove(i) => {
                    self.roles[i] = Some(Role::Removed);
                    self.stats.removed += 1;
                }
                Pending::Paired => {}
            }
        }
        debug_assert!(self.steps.iter().all(Option::is_some));
        debug_assert!(self.roles.iter().all(Option::is_some));

        let steps: Vec<Step> = self
            .steps
            .into_iter()
            .map(|s| s.unwrap_or(Step::Create))
            .collect();
        let roles: Vec<Role> = self
            .roles
            .into_iter()
            .map(|r| r.unwrap_or(Role::Removed))
            .collect();
        let removed = roles
            .iter()
            .enumerate()
            .filter_map(|(i, r)| matches!(r, Role::Removed).then_some(i))
            .collect();
        KeyedPlan {
            steps,
            roles,
            removed,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replay a plan on the old list and check it produces the new list.
    fn replay(old: &[&str], new: &[&str]) -> KeyedPlan {
        let plan = reconcile_keys(old, new);
        assert_eq!(plan.steps.len(), new.len());
        assert_eq!(plan.roles.len(), old.len());

        let mut used = vec![false; old.len()];
        for (j, step) in plan.steps.iter().enumerate() {
            match *step {
                Step::Keep(i) | Step::Move(i) => {
                    assert_eq!(old[i], new[j]);
                    assert!(!used[i], "old child {i} reused twice");
                    used[i] = true;
                }
                Step::Create => {}
            }
        }
        for &i in &plan.removed {
            assert!(!used[i]);
        }

        let kept: Vec<(usize, usize)> = plan
            .steps
            .iter()
            .enumerate()
            .filter_map(|(j, s)| match s {
                Step::Keep(i) => Some((*i, j)),
                _ => None,
            })
            .collect();
        assert!(kept.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 < w[1].1));
        plan
    }

    #[test]
    fn test_identical_lists_keep_everything() {
        let plan = replay(&["a", "b", "c"], &["a", "b", "c"]);
        assert_eq!(plan.stats.kept, 3);
        assert!(!plan.stats.used_map);
        assert_eq!(plan.tail_start(), 3);
    }

    #[test]
    fn test_rotation_is_one_move() {
        let plan = replay(&["k1", "k2", "k3"], &["k3", "k1", "k2"]);
        assert_eq!(plan.stats.moved, 1);
        assert_eq!(plan.stats.created, 0);
        assert_eq!(plan.stats.removed, 0);
        assert_eq!(plan.steps[0], Step::Move(2));
    }

    #[test]
    fn test_two_element_swap() {
        let plan = replay(&["a", "b"], &["b", "a"]);
        assert_eq!(plan.stats.swaps, 1);
        assert!(!plan.stats.used_map);
        assert_eq!(plan.stats.created + plan.stats.removed, 0);
    }

    #[test]
    fn test_insert_and_remove() {
        let plan = replay(&["a", "b", "c"], &["a", "x", "c"]);
        assert_eq!(plan.stats.created, 1);
        assert_eq!(plan.removed, vec![1]);
        assert_eq!(plan.steps[1], Step::Create);
    }

    #[test]
    fn test_append_is_tail() {
        let plan = replay(&["a"], &["a", "b", "c"]);
        assert_eq!(plan.tail_start(), 1);
        assert_eq!(plan.stats.created, 2);
    }

    #[test]
    fn test_reversal_uses_map() {
        let plan = replay(&["a", "b", "c", "d", "e"], &["e", "d", "c", "b", "a"]);
        assert!(plan.stats.used_map);
        assert_eq!(plan.stats.created + plan.stats.removed, 0);
        assert_eq!(plan.stats.kept + plan.stats.moved, 5);
    }

    #[test]
    fn test_duplicates_terminate() {
        let plan = replay(&["a", "a", "b"], &["b", "a", "a", "a"]);
        assert_eq!(plan.stats.created, 1);
        assert_eq!(plan.stats.removed, 0);

        let plan = replay(&["x", "x", "x"], &["x"]);
        assert_eq!(plan.stats.removed, 2);
    }

    #[test]
    fn test_disjoint_lists() {
        let plan = replay(&["a", "b"], &["c", "d", "e"]);
        assert_eq!(plan.stats.created, 3);
        assert_eq!(plan.removed, vec![0, 1]);
    }

    #[test]
    fn test_empty_sides() {
        let plan = replay(&[], &["a"]);
        assert_eq!(plan.steps, vec![Step::Create]);
        let plan = replay(&["a"], &[]);
        assert_eq!(plan.removed, vec![0]);
    }
}
