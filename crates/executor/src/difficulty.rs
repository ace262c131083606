//! The block difficulty formula across its three eras, with the ice-age
//! bomb.

use alloy_primitives::U256;
use ember_genesis::{ChainSpec, Fork};
use ember_primitives::{Header, EMPTY_OMMERS_HASH};

/// The adjustment denominator: parents move by `parent/2048` steps.
const BOUND_DIVISOR: u64 = 2048;

/// Frontier sped blocks up when they arrived within this many seconds.
const DURATION_LIMIT: u64 = 13;

/// The bomb doubles every this many blocks.
const EXPONENTIAL_PERIOD: u64 = 100_000;

/// The canonical difficulty of a block at `(number, timestamp)` on top of
/// `parent`.
pub fn calc_difficulty(
    spec: &ChainSpec,
    parent: &Header,
    number: u64,
    timestamp: u64,
) -> U256 {
    let fork = spec.fork_at(number);
    let parent_difficulty = parent.difficulty;
    let step = parent_difficulty / U256::from(BOUND_DIVISOR);
    let elapsed = timestamp.saturating_sub(parent.timestamp);

    let adjusted = if fork.at_least(Fork::Byzantium) {
        // EIP-100: target ommer-inclusive block production.
        let ommer_bonus: i64 = if parent.ommers_hash == EMPTY_OMMERS_HASH { 1 } else { 2 };
        let factor = (ommer_bonus - (elapsed / 9) as i64).max(-99);
        apply_factor(parent_difficulty, step, factor)
    } else if fork.at_least(Fork::Homestead) {
        let factor = (1 - (elapsed / 10) as i64).max(-99);
        apply_factor(parent_difficulty, step, factor)
    } else if elapsed < DURATION_LIMIT {
        parent_difficulty + step
    } else {
        parent_difficulty - step
    };

    let floored = adjusted.max(spec.min_difficulty);
    floored + bomb(spec, number)
}

fn apply_factor(parent_difficulty: U256, step: U256, factor: i64) -> U256 {
    if factor >= 0 {
        parent_difficulty + step * U256::from(factor as u64)
    } else {
        parent_difficulty.saturating_sub(step * U256::from(factor.unsigned_abs()))
    }
}

/// The ice-age term: `2^(fake_number/100000 - 2)`, where the fork schedule
/// pushes `fake_number` back from the true height.
fn bomb(spec: &ChainSpec, number: u64) -> U256 {
    let fake_number = number.saturating_sub(spec.forks.bomb_delay(number));
    let period = fake_number / EXPONENTIAL_PERIOD;
    if period < 2 {
        return U256::ZERO;
    }
    // The exponent is bounded by the word width; difficulty saturates there.
    if period - 2 >= 256 {
        return U256::MAX;
    }
    U256::from(1) << (period - 2)
}

#[cfg(test)]
mod test {
    use super::*;
    use ember_genesis::ChainSpec;

    fn parent(number: u64, timestamp: u64, difficulty: u64) -> Header {
        Header {
            number,
            timestamp,
            difficulty: U256::from(difficulty),
            ..Default::default()
        }
    }

    #[test]
    fn test_homestead_slow_block() {
        // A very late child backs difficulty off by the full -99 factor:
        // 1048576 - 512 · 99 = 997888.
        let spec = ChainSpec::ropsten();
        let parent = parent(0, 0, 0x0010_0000);
        assert_eq!(
            calc_difficulty(&spec, &parent, 1, 1_479_642_530),
            U256::from(997_888u64)
        );
    }

    #[test]
    fn test_homestead_fast_block() {
        let spec = ChainSpec::ropsten();
        let parent = parent(100, 1000, 0x0010_0000);
        // Nine seconds elapsed: factor 1 - 0 = 1.
        assert_eq!(
            calc_difficulty(&spec, &parent, 101, 1009),
            U256::from(0x0010_0000u64 + 512)
        );
    }

    #[test]
    fn test_minimum_clamps() {
        let spec = ChainSpec::mainnet();
        let parent = parent(1_200_000, 0, 131_072);
        let result = calc_difficulty(&spec, &parent, 1_200_001, 1_000_000);
        // The adjustment bottoms out at the floor; the period-12 bomb still
        // lands on top.
        assert_eq!(result, spec.min_difficulty + (U256::from(1) << 10));
    }

    #[test]
    fn test_bomb_period() {
        let spec = ChainSpec::mainnet();
        // Block 900000, Homestead era, no delay: period 9, bomb 2^7.
        let parent = parent(899_999, 1000, 17_000_000);
        let with_bomb = calc_difficulty(&spec, &parent, 900_000, 1009);
        let base = U256::from(17_000_000u64) + U256::from(17_000_000u64 / 2048);
        assert_eq!(with_bomb, base + (U256::from(1) << 7));
    }

    #[test]
    fn test_byzantium_ommer_bonus() {
        let spec = ChainSpec::mainnet();
        let mut with_ommers = parent(5_000_000, 1000, 3_000_000_000);
        with_ommers.ommers_hash = alloy_primitives::keccak256(b"ommers");
        let plain = parent(5_000_000, 1000, 3_000_000_000);

        let bonus = calc_difficulty(&spec, &with_ommers, 5_000_001, 1009);
        let without = calc_difficulty(&spec, &plain, 5_000_001, 1009);
        let step = U256::from(3_000_000_000u64 / 2048);
        assert_eq!(bonus, without + step);
    }
}
