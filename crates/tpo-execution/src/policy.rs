//! Per-backend capability table.
//!
//! The three backends differ only in a handful of flags; everything that
//! varies by backend in the aggregator, approval policy and router reads them
//! from here instead of branching on `BackendKind` ad hoc.

use tpo_schemas::{BackendKind, Collectable, Decimal};

/// When uncollected proceeds block a new order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CollectRequirement {
    /// Any collect type present blocks, even if the amount rounds to zero.
    Always,
    /// Only a non-zero amount blocks.
    WhenNonZero,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BackendPolicy {
    pub backend: BackendKind,
    /// Orders spend ERC-20 allowances (approval may be required).
    pub has_allowances: bool,
    /// Pool currency may be authorised with a signed permit, when the
    /// currency itself supports it.
    pub permit_capable: bool,
    pub collect_before_order: CollectRequirement,
    /// An outstanding order can be replaced by submitting a new amount.
    pub can_change_in_place: bool,
    pub can_cancel: bool,
}

const NATIVE: BackendPolicy = BackendPolicy {
    backend: BackendKind::Native,
    has_allowances: false,
    permit_capable: false,
    collect_before_order: CollectRequirement::WhenNonZero,
    can_change_in_place: true,
    can_cancel: true,
};

const EVM_BRIDGE: BackendPolicy = BackendPolicy {
    backend: BackendKind::EvmBridge,
    has_allowances: true,
    permit_capable: true,
    collect_before_order: CollectRequirement::Always,
    can_change_in_place: false,
    can_cancel: true,
};

const LEGACY_EVM: BackendPolicy = BackendPolicy {
    backend: BackendKind::LegacyEvm,
    has_allowances: true,
    permit_capable: false,
    collect_before_order: CollectRequirement::WhenNonZero,
    can_change_in_place: true,
    can_cancel: true,
};

impl BackendPolicy {
    pub const fn for_backend(backend: BackendKind) -> Self {
        match backend {
            BackendKind::Native => NATIVE,
            BackendKind::EvmBridge => EVM_BRIDGE,
            BackendKind::LegacyEvm => LEGACY_EVM,
        }
    }

    pub fn requires_collect(&self, collectable: &Collectable) -> bool {
        if collectable.is_empty() {
            return false;
        }
        match self.collect_before_order {
            CollectRequirement::Always => true,
            CollectRequirement::WhenNonZero => collectable.amount > Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpo_schemas::CollectType;

    #[test]
    fn only_the_bridge_refuses_in_place_changes() {
        assert!(BackendPolicy::for_backend(BackendKind::Native).can_change_in_place);
        assert!(BackendPolicy::for_backend(BackendKind::LegacyEvm).can_change_in_place);
        assert!(!BackendPolicy::for_backend(BackendKind::EvmBridge).can_change_in_place);
    }

    #[test]
    fn collect_requirement_by_backend() {
        let zero_tagged = Collectable {
            amount: Decimal::ZERO,
            collect_type: CollectType::Invest,
        };
        assert!(BackendPolicy::for_backend(BackendKind::EvmBridge).requires_collect(&zero_tagged));
        assert!(!BackendPolicy::for_backend(BackendKind::Native).requires_collect(&zero_tagged));

        let none = Collectable::none();
        for b in [BackendKind::Native, BackendKind::EvmBridge, BackendKind::LegacyEvm] {
            assert!(!BackendPolicy::for_backend(b).requires_collect(&none));
        }
    }
}
