//! Reconciliation policies for a device cart against a remote cart.
//!
//! Policies receive the cart both copies held after the last sync with the
//! same user (the baseline), when one is known. Reconciling a device cart
//! that has not changed since that sync must return the remote copy.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use storehouse_core::Cart;

/// Decides the cart that results from reconciling a device copy with the
/// user's remote copy.
pub trait ReconcilePolicy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Produce the reconciled cart.
    ///
    /// `base` is the last synced cart for this user, `None` when the device
    /// cart was never synced with them (first sign-in on this device).
    fn reconcile(&self, local: &Cart, remote: &Cart, base: Option<&Cart>) -> Cart;
}

/// The remote copy fully replaces the device copy. No per-item merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriterWins;

impl ReconcilePolicy for LastWriterWins {
    fn name(&self) -> &'static str {
        "last-writer-wins"
    }

    fn reconcile(&self, _local: &Cart, remote: &Cart, _base: Option<&Cart>) -> Cart {
        remote.clone()
    }
}

/// Device edits are added onto the remote copy.
///
/// Without a baseline the whole device cart counts as new and quantities
/// are summed per product. With one, only the per-product change since the
/// baseline is applied to the remote copy, so removals made on this device
/// stick and an unchanged device cart adds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdditiveMerge;

impl ReconcilePolicy for AdditiveMerge {
    fn name(&self) -> &'static str {
        "additive-merge"
    }

    fn reconcile(&self, local: &Cart, remote: &Cart, base: Option<&Cart>) -> Cart {
        let Some(base) = base else {
            return local.merged_with(remote);
        };

        let products: BTreeSet<_> = local
            .iter()
            .chain(remote.iter())
            .chain(base.iter())
            .map(|(product, _)| product.clone())
            .collect();

        products
            .into_iter()
            .map(|product| {
                let quantity = i64::from(remote.quantity(&product))
                    + i64::from(local.quantity(&product))
                    - i64::from(base.quantity(&product));
                let quantity = u32::try_from(quantity.max(0)).unwrap_or(u32::MAX);
                (product, quantity)
            })
            .collect()
    }
}

/// Configurable choice of built-in policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyKind {
    #[default]
    LastWriterWins,
    AdditiveMerge,
}

impl PolicyKind {
    /// Instantiate the policy.
    #[must_use]
    pub fn into_policy(self) -> Arc<dyn ReconcilePolicy> {
        match self {
            Self::LastWriterWins => Arc::new(LastWriterWins),
            Self::AdditiveMerge => Arc::new(AdditiveMerge),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastWriterWins => f.write_str("last-writer-wins"),
            Self::AdditiveMerge => f.write_str("additive-merge"),
        }
    }
}

/// Unknown policy name.
#[derive(Debug, thiserror::Error)]
#[error("unknown reconcile policy '{0}' (expected last-writer-wins or additive-merge)")]
pub struct UnknownPolicy(String);

impl FromStr for PolicyKind {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last-writer-wins" | "lww" => Ok(Self::LastWriterWins),
            "additive-merge" | "merge" => Ok(Self::AdditiveMerge),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use storehouse_core::ProductId;

    fn cart(entries: &[(&str, u32)]) -> Cart {
        entries
            .iter()
            .map(|(id, q)| (ProductId::new(*id), *q))
            .collect()
    }

    #[test]
    fn test_last_writer_wins_takes_remote() {
        let result = LastWriterWins.reconcile(&cart(&[("a", 2)]), &cart(&[("b", 1)]), None);
        assert_eq!(result, cart(&[("b", 1)]));
    }

    #[test]
    fn test_last_writer_wins_empty_remote_empties() {
        let result = LastWriterWins.reconcile(&cart(&[("a", 2)]), &Cart::new(), None);
        assert!(result.is_empty());
    }

    #[test]
    fn test_additive_merge_sums_without_baseline() {
        let result =
            AdditiveMerge.reconcile(&cart(&[("a", 2), ("b", 1)]), &cart(&[("b", 1)]), None);
        assert_eq!(result, cart(&[("a", 2), ("b", 2)]));
    }

    #[test]
    fn test_additive_merge_is_stable_when_nothing_changed() {
        let synced = cart(&[("a", 2), ("b", 2)]);
        let result = AdditiveMerge.reconcile(&synced, &synced, Some(&synced));
        assert_eq!(result, synced);
    }

    #[test]
    fn test_additive_merge_applies_device_changes_since_baseline() {
        let base = cart(&[("a", 2), ("b", 1)]);
        let local = cart(&[("a", 3), ("c", 1)]);
        let remote = cart(&[("a", 2), ("b", 1), ("d", 4)]);

        let result = AdditiveMerge.reconcile(&local, &remote, Some(&base));

        assert_eq!(result, cart(&[("a", 3), ("c", 1), ("d", 4)]));
    }

    #[test]
    fn test_additive_merge_keeps_remote_changes_when_device_unchanged() {
        let base = cart(&[("a", 2)]);
        let remote = cart(&[("a", 5), ("b", 1)]);

        let result = AdditiveMerge.reconcile(&base, &remote, Some(&base));

        assert_eq!(result, remote);
    }

    #[test]
    fn test_additive_merge_never_goes_negative() {
        let base = cart(&[("a", 3)]);
        let local = cart(&[]);
        let remote = cart(&[("a", 1)]);

        let result = AdditiveMerge.reconcile(&local, &remote, Some(&base));

        assert!(result.is_empty());
    }

    #[test]
    fn test_policy_kind_parse() {
        assert_eq!(
            "last-writer-wins".parse::<PolicyKind>().unwrap(),
            PolicyKind::LastWriterWins
        );
        assert_eq!(
            " Additive-Merge ".parse::<PolicyKind>().unwrap(),
            PolicyKind::AdditiveMerge
        );
        assert!("newest".parse::<PolicyKind>().is_err());
    }

    #[test]
    fn test_policy_kind_round_trips_name() {
        for kind in [PolicyKind::LastWriterWins, PolicyKind::AdditiveMerge] {
            assert_eq!(kind.into_policy().name(), kind.to_string());
        }
    }
}
