mod common;

use anchor_lang::prelude::Pubkey;
use futures_engine::{
    fee_amount, redemption_value, required_usdc, vol_points, TokenConfig, UserPosition,
    DEFAULT_USDC_PER_VOL_POINT,
};

#[test]
fn test_vol_points_conversion() {
    assert_eq!(vol_points(0.85), 850);
    assert_eq!(vol_points(0.0), 0);
    assert_eq!(vol_points(1.2345), 1234);
}

#[test]
fn test_required_usdc() {
    // 10 tokens at 850 vol points: 10 * 850 * 100_000 / 1000 = 850 USDC.
    let usdc = required_usdc(10, 850, DEFAULT_USDC_PER_VOL_POINT).expect("usdc");
    assert_eq!(usdc, 850_000_000);
}

#[test]
fn test_required_usdc_overflow() {
    assert!(required_usdc(u64::MAX, 850, DEFAULT_USDC_PER_VOL_POINT).is_none());
}

#[test]
fn test_fee_amount() {
    let value = 850_000_000u64;
    assert_eq!(fee_amount(value, 100).expect("fee"), 8_500_000); // 1%
    assert_eq!(fee_amount(value, 0).expect("fee"), 0);
    assert_eq!(fee_amount(value, 10_000).expect("fee"), value);
}

#[test]
fn test_redemption_value_flat() {
    let value = redemption_value(10, 850, 850, DEFAULT_USDC_PER_VOL_POINT).expect("value");
    assert_eq!(value, 850_000_000);
}

#[test]
fn test_redemption_value_profit_on_vol_rise() {
    let base = redemption_value(10, 850, 850, DEFAULT_USDC_PER_VOL_POINT).expect("value");
    let value = redemption_value(10, 850, 900, DEFAULT_USDC_PER_VOL_POINT).expect("value");
    // 50 extra points on 10 tokens: 100_000 * 10 * 50 / 1000 = 50 USDC.
    assert_eq!(value, base + 50_000_000);
}

#[test]
fn test_redemption_value_loss_on_vol_drop() {
    let base = redemption_value(10, 850, 850, DEFAULT_USDC_PER_VOL_POINT).expect("value");
    let value = redemption_value(10, 850, 800, DEFAULT_USDC_PER_VOL_POINT).expect("value");
    assert_eq!(value, base - 50_000_000);
}

#[test]
fn test_redemption_value_floors_at_one() {
    // Volatility collapsed to zero: the loss swallows the whole base value
    // and the payout floors at a single base unit.
    let value = redemption_value(10, 850, 0, DEFAULT_USDC_PER_VOL_POINT).expect("value");
    assert_eq!(value, 1);
}

#[test]
fn test_token_config_roundtrip_len() {
    let config = TokenConfig {
        authority: Pubkey::new_unique(),
        token_mint: Pubkey::new_unique(),
        usdc_mint: Pubkey::new_unique(),
        fee_destination: Pubkey::new_unique(),
        collateral_pool: Pubkey::new_unique(),
        token_name: "Volatility Futures".to_string(),
        token_symbol: "vFUT".to_string(),
        fee_bps: 50,
        oracle: Pubkey::new_unique(),
        total_tokens_outstanding: 0,
        usdc_per_vol_point: DEFAULT_USDC_PER_VOL_POINT,
        collateral_pool_bump: 254,
        bump: 255,
    };
    let data = common::setup::serialize_anchor_account(&config);
    // Strings serialize at their actual length; LEN reserves the maximum.
    assert!(data.len() <= 8 + TokenConfig::LEN);
}

#[test]
fn test_user_position_len() {
    let position = UserPosition {
        owner: Pubkey::new_unique(),
        entry_volatility: 0.85,
        tokens_minted: 10,
        usdc_collateral: 850_000_000,
        mint_timestamp: 1_700_000_000,
        bump: 255,
    };
    let data = common::setup::serialize_anchor_account(&position);
    assert_eq!(data.len(), 8 + UserPosition::LEN);
}
