//! Per-tile lifecycle states

/// Residency state of a single tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileState {
    /// No backing slot, not requested
    Free,
    /// Wanted by feedback, waiting in the requested queue for a slot
    Requested,
    /// Holds a heap slot; the driver has not mapped it yet
    Allocated,
    /// Holds a heap slot and is mapped by the driver
    Mapped,
    /// Still mapped driver-side, but inactive; candidate for eviction
    Standby,
}

impl TileState {
    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// Standby reactivates straight to Mapped since the driver mapping
    /// never went away.
    pub fn can_transition_to(self, next: TileState) -> bool {
        use TileState::*;
        matches!(
            (self, next),
            (Free, Requested)
                | (Requested, Allocated)
                | (Allocated, Mapped)
                | (Mapped, Standby)
                | (Mapped, Free)
                | (Standby, Mapped)
                | (Standby, Free)
        )
    }

    /// True while the tile occupies a heap slot.
    pub fn holds_slot(self) -> bool {
        matches!(
            self,
            TileState::Allocated | TileState::Mapped | TileState::Standby
        )
    }

    /// True while the tile's contents are addressable by the GPU.
    pub fn is_resident(self) -> bool {
        matches!(self, TileState::Mapped | TileState::Standby)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TileState::*;

    #[test]
    fn test_allowed_transitions() {
        let allowed = [
            (Free, Requested),
            (Requested, Allocated),
            (Allocated, Mapped),
            (Mapped, Standby),
            (Mapped, Free),
            (Standby, Mapped),
            (Standby, Free),
        ];
        for (from, to) in allowed {
            assert!(from.can_transition_to(to), "{:?} -> {:?}", from, to);
        }
    }

    #[test]
    fn test_forbidden_transitions() {
        let forbidden = [
            (Free, Mapped),
            (Free, Allocated),
            (Free, Standby),
            (Requested, Mapped),
            (Requested, Free),
            (Allocated, Free),
            (Allocated, Standby),
            (Standby, Requested),
            (Mapped, Requested),
            (Mapped, Allocated),
        ];
        for (from, to) in forbidden {
            assert!(!from.can_transition_to(to), "{:?} -> {:?}", from, to);
        }

        // Re-entering the current state is never allowed
        for state in [Free, Requested, Allocated, Mapped, Standby] {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_slot_and_residency_predicates() {
        assert!(!Free.holds_slot());
        assert!(!Requested.holds_slot());
        assert!(Allocated.holds_slot());
        assert!(Mapped.holds_slot());
        assert!(Standby.holds_slot());

        assert!(!Allocated.is_resident());
        assert!(Mapped.is_resident());
        assert!(Standby.is_resident());
    }
}
