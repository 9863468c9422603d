//! Observer merging
//!
//! A read-only call that repeats an earlier call with the same receiver,
//! method and arguments yields the same value, so the splitter records its
//! target as an alias of the earlier target instead of emitting it again.
//!
//! An alias lives until a slot it depends on (receiver, arguments, or the
//! original target) is written, or until a `Reset`. When that happens the
//! alias is materialized: the aliased slot gets its own live set, made of the
//! producers of the original value plus the merged call.

use crate::tracker::LiveSet;
use frag_ir::{MethodId, Operands, Reference};
use std::collections::HashMap;

/// Identity of an observer call after alias resolution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObserverKey {
    /// Receiver slot
    pub receiver: Reference,
    /// Method called
    pub method: MethodId,
    /// Argument slots
    pub params: Vec<Reference>,
}

impl ObserverKey {
    /// Whether `slot` is the receiver or one of the arguments
    #[must_use]
    pub fn mentions(&self, slot: Reference) -> bool {
        self.receiver == slot || self.params.contains(&slot)
    }
}

#[derive(Debug, Clone)]
struct Alias {
    origin: Reference,
    deps: Operands,
    materialized: LiveSet,
}

/// Tracked observer calls and the aliases they created
#[derive(Debug, Default)]
pub struct ObserverIndex {
    records: HashMap<ObserverKey, Reference>,
    aliases: HashMap<Reference, Alias>,
    merged: usize,
}

impl ObserverIndex {
    /// Empty index
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot that actually holds the value of `slot`
    #[inline]
    #[must_use]
    pub fn resolve(&self, slot: Reference) -> Reference {
        self.aliases.get(&slot).map_or(slot, |a| a.origin)
    }

    /// Target of a still-valid earlier call with the same key
    #[inline]
    #[must_use]
    pub fn lookup(&self, key: &ObserverKey) -> Option<Reference> {
        self.records.get(key).copied()
    }

    /// Track an observer call whose result is bound to `target`
    pub fn record(&mut self, key: ObserverKey, target: Reference) {
        self.records.insert(key, target);
    }

    /// Make `alias` stand for `origin`, which was produced by `key`.
    ///
    /// `materialized` is the live set the alias takes over if it is
    /// invalidated later.
    pub fn add_alias(
        &mut self,
        alias: Reference,
        origin: Reference,
        key: &ObserverKey,
        materialized: LiveSet,
    ) {
        let mut deps: Operands = Operands::new();
        deps.push(key.receiver);
        deps.extend(key.params.iter().copied());
        deps.push(origin);
        self.aliases.insert(
            alias,
            Alias {
                origin,
                deps,
                materialized,
            },
        );
        self.merged += 1;
    }

    /// Forget everything that depends on the value of `written`.
    ///
    /// Returns the aliases that must now hold their own value, with the live
    /// set each takes over. An alias on `written` itself is dropped without
    /// being materialized.
    pub fn invalidate(&mut self, written: Reference) -> Vec<(Reference, LiveSet)> {
        self.records
            .retain(|key, target| *target != written && !key.mentions(written));
        self.aliases.remove(&written);

        let stale: Vec<Reference> = self
            .aliases
            .iter()
            .filter(|(_, a)| a.deps.contains(&written))
            .map(|(slot, _)| *slot)
            .collect();

        let mut out = Vec::with_capacity(stale.len());
        for slot in stale {
            if let Some(alias) = self.aliases.remove(&slot) {
                self.records
                    .retain(|key, target| *target != slot && !key.mentions(slot));
                out.push((slot, alias.materialized));
            }
        }
        out.sort_by_key(|(slot, _)| *slot);
        out
    }

    /// Drop all records and aliases (`Reset`)
    pub fn clear(&mut self) {
        self.records.clear();
        self.aliases.clear();
    }

    /// Number of calls merged so far
    #[inline]
    #[must_use]
    pub fn merged(&self) -> usize {
        self.merged
    }

    /// Number of live aliases
    #[inline]
    #[must_use]
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}
