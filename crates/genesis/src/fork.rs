//! The consensus-rule eras and their block-number activation table.

use serde::{Deserialize, Serialize};

/// A consensus-rule era. Later forks imply every earlier fork's rules except
/// where explicitly superseded (Petersburg removes Constantinople's net gas
/// metering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fork {
    /// The launch rules.
    Frontier,
    /// EIP-2 intrinsic-gas and difficulty changes, DELEGATECALL.
    Homestead,
    /// EIP-150 gas repricing and the 63/64 call-gas rule.
    Tangerine,
    /// EIP-155 replay protection, EIP-158 empty-account clearing, EIP-170
    /// code-size cap.
    SpuriousDragon,
    /// REVERT, RETURNDATA, STATICCALL, status receipts, new precompiles.
    Byzantium,
    /// SHL/SHR/SAR, CREATE2, EXTCODEHASH, net gas metering.
    Constantinople,
    /// Constantinople with EIP-1283 net gas metering removed.
    Petersburg,
    /// EIP-2200 net gas metering, repriced SLOAD and balance opcodes,
    /// blake2f.
    Istanbul,
}

impl Fork {
    /// True when this era includes the rules introduced by `other`.
    pub fn at_least(self, other: Self) -> bool {
        self >= other
    }
}

/// Block numbers at which each fork activates. `None` means the fork never
/// activates on the chain. This is configuration data, not consensus code:
/// every chain supplies its own table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkSchedule {
    /// Homestead activation block.
    pub homestead: Option<u64>,
    /// Tangerine Whistle (EIP-150) activation block.
    pub tangerine: Option<u64>,
    /// Spurious Dragon activation block.
    pub spurious_dragon: Option<u64>,
    /// Byzantium activation block.
    pub byzantium: Option<u64>,
    /// Constantinople activation block.
    pub constantinople: Option<u64>,
    /// Petersburg activation block.
    pub petersburg: Option<u64>,
    /// Istanbul activation block.
    pub istanbul: Option<u64>,
}

impl ForkSchedule {
    /// The era in force at block `number`.
    pub fn fork_at(&self, number: u64) -> Fork {
        let active = |activation: Option<u64>| activation.is_some_and(|at| number >= at);
        if active(self.istanbul) {
            Fork::Istanbul
        } else if active(self.petersburg) {
            Fork::Petersburg
        } else if active(self.constantinople) {
            Fork::Constantinople
        } else if active(self.byzantium) {
            Fork::Byzantium
        } else if active(self.spurious_dragon) {
            Fork::SpuriousDragon
        } else if active(self.tangerine) {
            Fork::Tangerine
        } else if active(self.homestead) {
            Fork::Homestead
        } else {
            Fork::Frontier
        }
    }

    /// How many blocks the difficulty bomb is pushed back at `number`
    /// (EIP-649 and EIP-1234).
    pub fn bomb_delay(&self, number: u64) -> u64 {
        match self.fork_at(number) {
            fork if fork.at_least(Fork::Constantinople) => 5_000_000,
            Fork::Byzantium => 3_000_000,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fork_ordering() {
        assert!(Fork::Istanbul.at_least(Fork::Byzantium));
        assert!(Fork::Petersburg.at_least(Fork::Constantinople));
        assert!(!Fork::Homestead.at_least(Fork::Tangerine));
    }

    #[test]
    fn test_fork_at() {
        let schedule = ForkSchedule {
            homestead: Some(1_150_000),
            tangerine: Some(2_463_000),
            spurious_dragon: Some(2_675_000),
            byzantium: Some(4_370_000),
            constantinople: Some(7_280_000),
            petersburg: Some(7_280_000),
            istanbul: Some(9_069_000),
        };
        assert_eq!(schedule.fork_at(0), Fork::Frontier);
        assert_eq!(schedule.fork_at(1_150_000), Fork::Homestead);
        assert_eq!(schedule.fork_at(2_674_999), Fork::Tangerine);
        assert_eq!(schedule.fork_at(4_370_000), Fork::Byzantium);
        // Petersburg supersedes Constantinople at the same height.
        assert_eq!(schedule.fork_at(7_280_000), Fork::Petersburg);
        assert_eq!(schedule.fork_at(10_000_000), Fork::Istanbul);
    }

    #[test]
    fn test_unscheduled_forks_never_activate() {
        let schedule = ForkSchedule::default();
        assert_eq!(schedule.fork_at(u64::MAX), Fork::Frontier);
        assert_eq!(schedule.bomb_delay(u64::MAX), 0);
    }
}
