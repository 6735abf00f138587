// 4.0: perp position tracking. szi is signed size, entry_ntl the cost basis in perp usd.
// 4.1 has the fill math at the bottom: increase, reduce, flip.

use crate::types::{to_i64, to_u64, CastError, Side};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Signed size: positive = long, negative = short.
    pub szi: i64,
    pub entry_ntl: u64,
    /// Margin dedicated to this position. Only meaningful when isolated.
    pub isolated_raw_usd: i64,
    pub leverage: u32,
    pub is_isolated: bool,
}

impl Position {
    pub fn flat(leverage: u32, is_isolated: bool) -> Self {
        Self {
            szi: 0,
            entry_ntl: 0,
            isolated_raw_usd: 0,
            leverage,
            is_isolated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.szi == 0
    }

    pub fn side(&self) -> Option<Side> {
        match self.szi.signum() {
            1 => Some(Side::Long),
            -1 => Some(Side::Short),
            _ => None,
        }
    }

    pub fn abs_size(&self) -> u64 {
        self.szi.unsigned_abs()
    }

    pub fn notional(&self, mark_px: u64) -> i128 {
        self.abs_size() as i128 * mark_px as i128
    }

    // 4.2: paper gains/losses against the mark
    pub fn unrealized_pnl(&self, mark_px: u64) -> i128 {
        let ntl = self.notional(mark_px);
        let entry = self.entry_ntl as i128;
        if self.szi >= 0 {
            ntl - entry
        } else {
            entry - ntl
        }
    }

    /// Entry notional with the position's sign. Longs paid it, shorts received it.
    pub fn signed_entry_ntl(&self) -> i128 {
        if self.szi < 0 {
            -(self.entry_ntl as i128)
        } else {
            self.entry_ntl as i128
        }
    }
}

/// Result of applying one fill to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionUpdate {
    pub new_position: Position,
    /// PnL realized by the reducing part of the fill.
    pub realized_pnl: i64,
    /// Isolated margin handed back by the reducing part of the fill.
    pub margin_released: i64,
    /// Size added in the fill's direction (new exposure that needs margin).
    pub opened_size: u64,
}

// 4.3: one fill of signed `delta` at `px`. same direction adds to the cost basis,
// opposite direction realizes pro rata, anything past flat opens the other side.
pub fn apply_fill(position: &Position, delta: i64, px: u64) -> Result<PositionUpdate, CastError> {
    let old = position.szi as i128;
    let delta_wide = delta as i128;
    let px_wide = px as i128;

    if delta == 0 {
        return Ok(PositionUpdate {
            new_position: *position,
            realized_pnl: 0,
            margin_released: 0,
            opened_size: 0,
        });
    }

    if old == 0 || old.signum() == delta_wide.signum() {
        let added_ntl = delta_wide.abs() * px_wide;
        let mut next = *position;
        next.szi = to_i64(old + delta_wide)?;
        let entry = (position.entry_ntl as i128)
            .checked_add(added_ntl)
            .ok_or(CastError::UintDowncast { bits: 64, value: "entry ntl overflow".to_string() })?;
        next.entry_ntl = to_u64(entry)?;
        return Ok(PositionUpdate {
            new_position: next,
            realized_pnl: 0,
            margin_released: 0,
            opened_size: delta.unsigned_abs(),
        });
    }

    let old_abs = old.abs();
    let closed = delta_wide.abs().min(old_abs);
    let entry_portion = position.entry_ntl as i128 * closed / old_abs;
    let exit_ntl = closed * px_wide;
    let realized = if old > 0 {
        exit_ntl - entry_portion
    } else {
        entry_portion - exit_ntl
    };
    let released = if closed == old_abs {
        position.isolated_raw_usd as i128
    } else {
        position.isolated_raw_usd as i128 * closed / old_abs
    };

    let mut next = *position;
    next.entry_ntl = to_u64(position.entry_ntl as i128 - entry_portion)?;
    next.isolated_raw_usd = to_i64(position.isolated_raw_usd as i128 - released)?;
    next.szi = to_i64(old + delta_wide)?;

    let remainder = delta_wide.abs() - closed;
    if remainder > 0 {
        next.entry_ntl = to_u64(remainder * px_wide)?;
        next.isolated_raw_usd = 0;
    }

    Ok(PositionUpdate {
        new_position: next,
        realized_pnl: to_i64(realized)?,
        margin_released: to_i64(released)?,
        opened_size: to_u64(remainder)?,
    })
}
