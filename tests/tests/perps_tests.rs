mod common;

use anchor_lang::prelude::Pubkey;
use perps_engine::{position_pnl, settlement_payout, Position, Side, SyntheticMint, VaultConfig};

#[test]
fn test_long_profits_when_vol_rises() {
    let pnl = position_pnl(Side::Long, 0.50, 0.75, 1_000_000);
    assert_eq!(pnl, 250_000);
}

#[test]
fn test_long_loses_when_vol_drops() {
    let pnl = position_pnl(Side::Long, 0.75, 0.50, 1_000_000);
    assert_eq!(pnl, -250_000);
}

#[test]
fn test_short_mirrors_long() {
    let size = 1_000_000u64;
    let long = position_pnl(Side::Long, 0.50, 0.75, size);
    let short = position_pnl(Side::Short, 0.50, 0.75, size);
    assert_eq!(long, -short);
}

#[test]
fn test_flat_vol_is_flat_pnl() {
    assert_eq!(position_pnl(Side::Long, 0.65, 0.65, 1_000_000), 0);
    assert_eq!(position_pnl(Side::Short, 0.65, 0.65, 1_000_000), 0);
}

#[test]
fn test_settlement_payout_adds_pnl() {
    assert_eq!(settlement_payout(1_000_000, 250_000), 1_250_000);
    assert_eq!(settlement_payout(1_000_000, -250_000), 750_000);
}

#[test]
fn test_settlement_payout_clamps_at_zero() {
    // Losses beyond the posted margin never go negative.
    assert_eq!(settlement_payout(1_000_000, -1_500_000), 0);
    assert_eq!(settlement_payout(0, -1), 0);
}

#[test]
fn test_position_account_len() {
    let position = Position {
        owner: Pubkey::new_unique(),
        direction: Side::Long,
        entry_vol: 0.85,
        size: 1_000_000,
        margin: 1_000_000,
        bump: 254,
        created_at: 1_700_000_000,
        is_active: true,
    };
    let data = common::setup::serialize_anchor_account(&position);
    assert_eq!(data.len(), 8 + Position::LEN);
}

#[test]
fn test_vault_config_len() {
    let config = VaultConfig {
        custom_vault: Pubkey::new_unique(),
        bump: 255,
    };
    let data = common::setup::serialize_anchor_account(&config);
    assert_eq!(data.len(), 8 + VaultConfig::LEN);

    let synthetic = SyntheticMint { bump: 255 };
    let data = common::setup::serialize_anchor_account(&synthetic);
    assert_eq!(data.len(), 8 + SyntheticMint::LEN);
}

#[test]
fn test_position_reuse_after_close() {
    let mut position = Position {
        owner: Pubkey::new_unique(),
        direction: Side::Short,
        entry_vol: 0.70,
        size: 500_000,
        margin: 500_000,
        bump: 253,
        created_at: 1_700_000_000,
        is_active: true,
    };
    position.is_active = false;
    assert!(!position.is_active);
    assert!(matches!(position.direction, Side::Long | Side::Short));
}
