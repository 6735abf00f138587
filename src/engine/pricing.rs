//! Price update operations.

use super::core::CoreSim;
use super::results::{CoreError, PrecompileError};
use crate::events::{EventPayload, PriceUpdateEvent};
use crate::oracle::{PriceError, PriceKey};
use crate::types::{Asset, Bps, PerpId, SpotMarketId};

impl CoreSim {
    pub fn set_mark_px(&mut self, perp: PerpId, px: u64) -> Result<(), CoreError> {
        self.ensure_market(PriceKey::Mark(perp))?;
        self.ledger.oracle.set(PriceKey::Mark(perp), px)?;
        self.on_price_update(PriceKey::Mark(perp), px);
        Ok(())
    }

    /// Moves the mark by `bps`. Fails if no mark was ever set.
    pub fn bump_mark_px(
        &mut self,
        perp: PerpId,
        bps: Bps,
        is_increase: bool,
    ) -> Result<u64, CoreError> {
        self.bump(PriceKey::Mark(perp), bps, is_increase)
    }

    pub fn set_spot_px(&mut self, spot: SpotMarketId, px: u64) -> Result<(), CoreError> {
        self.ensure_market(PriceKey::Spot(spot))?;
        self.ledger.oracle.set(PriceKey::Spot(spot), px)?;
        self.on_price_update(PriceKey::Spot(spot), px);
        Ok(())
    }

    pub fn bump_spot_px(
        &mut self,
        spot: SpotMarketId,
        bps: Bps,
        is_increase: bool,
    ) -> Result<u64, CoreError> {
        self.bump(PriceKey::Spot(spot), bps, is_increase)
    }

    fn bump(&mut self, key: PriceKey, bps: Bps, is_increase: bool) -> Result<u64, CoreError> {
        self.ensure_market(key)?;
        let px = self
            .ledger
            .oracle
            .bump(key, bps, is_increase)
            .map_err(price_read_error)?;
        self.on_price_update(key, px);
        Ok(px)
    }

    fn ensure_market(&self, key: PriceKey) -> Result<(), CoreError> {
        let registered = match key {
            PriceKey::Mark(perp) => self.ledger.registry.perp_info(perp).is_some(),
            PriceKey::Spot(spot) => self.ledger.registry.spot_info(spot).is_some(),
        };
        if registered {
            return Ok(());
        }
        Err(CoreError::UnknownAsset(match key {
            PriceKey::Mark(perp) => Asset::Perp(perp),
            PriceKey::Spot(spot) => Asset::Spot(spot),
        }))
    }

    fn on_price_update(&mut self, key: PriceKey, px: u64) {
        self.emit_event(EventPayload::PriceUpdate(PriceUpdateEvent { key, px }));
    }
}

/// A missing price is a failed precompile read. Anything else is a price error.
pub(super) fn price_read_error(err: PriceError) -> CoreError {
    match err {
        PriceError::NotSet(PriceKey::Mark(_)) => {
            CoreError::precompile(PrecompileError::MarkPx, &err)
        }
        PriceError::NotSet(PriceKey::Spot(_)) => {
            CoreError::precompile(PrecompileError::SpotPx, &err)
        }
        other => CoreError::Price(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::registry::PerpAssetInfo;

    fn sim_with_perp() -> CoreSim {
        let mut sim = CoreSim::new(SimConfig::default());
        sim.register_perp(PerpId(0), PerpAssetInfo::new("BTC", 5, 40)).unwrap();
        sim
    }

    #[test]
    fn bump_by_five_percent() {
        let mut sim = sim_with_perp();
        sim.set_mark_px(PerpId(0), 100).unwrap();
        assert_eq!(sim.bump_mark_px(PerpId(0), Bps(500), true).unwrap(), 105);
        assert_eq!(sim.read_mark_px(PerpId(0)).unwrap(), 105);
    }

    #[test]
    fn bump_without_price_is_precompile_failure() {
        let mut sim = sim_with_perp();
        let err = sim.bump_mark_px(PerpId(0), Bps(100), false).unwrap_err();
        assert!(matches!(
            err,
            CoreError::PrecompileFailed { precompile: PrecompileError::MarkPx, .. }
        ));
    }

    #[test]
    fn bump_to_zero_rejected() {
        let mut sim = sim_with_perp();
        sim.set_mark_px(PerpId(0), 100).unwrap();
        let err = sim.bump_mark_px(PerpId(0), Bps(10_000), false).unwrap_err();
        assert!(matches!(err, CoreError::Price(PriceError::InvalidPrice { .. })));
        assert_eq!(sim.read_mark_px(PerpId(0)).unwrap(), 100);
    }

    #[test]
    fn unregistered_market_rejected() {
        let mut sim = sim_with_perp();
        assert_eq!(
            sim.set_mark_px(PerpId(9), 1),
            Err(CoreError::UnknownAsset(Asset::Perp(PerpId(9))))
        );
    }
}
