use anchor_lang::prelude::*;
use pyth_solana_receiver_sdk::price_update::{get_feed_id_from_hex, PriceUpdateV2};

declare_id!("2UDXAC3iF6gZ3ZxdXNT3Pj2JApGNQQ344CxQGhbrBYt3");

/// Pyth SOL/USD feed id (hex form, as required by the receiver SDK).
pub const SOL_USD_FEED_ID: &str =
    "ef0d8b6fda2ceba41da15d4095d1da392a0d2f8ed0c6c7bc0f4cfac8c280b56d";

/// Reject price updates older than this many seconds.
pub const MAX_PRICE_AGE_SECS: u64 = 30;

/// Spot prices are stored as fixed-point integers at this scale.
pub const PRICE_SCALE: f64 = 1_000_000.0;

/// Annualization factor: volatility per sample -> per year over trading days.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[program]
pub mod volatility_oracle {
    use super::*;

    /// Create a fresh stats account with a zeroed accumulator.
    /// The account keypair co-signs; the authority pays and becomes the
    /// only signer allowed to push samples.
    pub fn initialize_volatility_stats(ctx: Context<Initialize>) -> Result<()> {
        let stats = &mut ctx.accounts.volatility_stats;
        stats.authority = ctx.accounts.authority.key();
        stats.last_price = 0;
        stats.mean = 0.0;
        stats.m2 = 0.0;
        stats.count = 0;
        stats.annualized_volatility = 0.0;

        msg!("Volatility stats initialized, authority: {}", stats.authority);

        let clock = Clock::get()?;
        emit!(VolatilityInitialized {
            stats: stats.key(),
            authority: stats.authority,
            timestamp: clock.unix_timestamp,
        });

        Ok(())
    }

    /// Fold one Pyth SOL/USD sample into the running log-return stream.
    /// The first accepted sample only seeds `last_price`; every later one
    /// contributes a return and refreshes the annualized estimate.
    pub fn update_volatility(ctx: Context<UpdateVolatility>) -> Result<()> {
        let price_update = &ctx.accounts.price_update;

        let feed_id = get_feed_id_from_hex(SOL_USD_FEED_ID)
            .map_err(|_| error!(OracleError::InvalidPythAccount))?;
        let price = price_update
            .get_price_no_older_than(&Clock::get()?, MAX_PRICE_AGE_SECS, &feed_id)
            .map_err(|_| error!(OracleError::NoPriceAvailable))?;

        msg!(
            "SOL/USD price: ({} ± {}) * 10^{}",
            price.price,
            price.conf,
            price.exponent
        );

        let spot = (price.price as f64) * 10f64.powi(price.exponent);
        require!(spot > 0.0, OracleError::InvalidPriceData);

        let stats = &mut ctx.accounts.volatility_stats;
        if stats.count == 0 {
            stats.count = 1;
        } else {
            let last_spot = (stats.last_price as f64) / PRICE_SCALE;
            let log_return = (spot / last_spot).ln();
            let (mean, m2, count) = welford_step(stats.mean, stats.m2, stats.count, log_return);
            stats.mean = mean;
            stats.m2 = m2;
            stats.count = count;
            if let Some(vol) = annualized_volatility(m2, count) {
                stats.annualized_volatility = vol;
                msg!("Annualized volatility: {}", vol);
            }
        }
        stats.last_price = to_fixed_price(spot);

        let clock = Clock::get()?;
        emit!(VolatilityUpdated {
            stats: stats.key(),
            last_price: stats.last_price,
            count: stats.count,
            annualized_volatility: stats.annualized_volatility,
            timestamp: clock.unix_timestamp,
        });

        Ok(())
    }
}

/// One Welford update over the running log-return stream.
/// Returns the advanced `(mean, m2, count)` triple.
pub fn welford_step(mean: f64, m2: f64, count: u64, log_return: f64) -> (f64, f64, u64) {
    let count = count + 1;
    let delta = log_return - mean;
    let mean = mean + delta / count as f64;
    let m2 = m2 + delta * (log_return - mean);
    (mean, m2, count)
}

/// Sample annualized volatility from the Welford accumulator.
/// None until at least two samples have been seen.
pub fn annualized_volatility(m2: f64, count: u64) -> Option<f64> {
    if count < 2 {
        return None;
    }
    let variance = m2 / (count - 1) as f64;
    Some(variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt())
}

pub fn to_fixed_price(spot: f64) -> u64 {
    (spot * PRICE_SCALE) as u64
}

#[derive(Accounts)]
pub struct Initialize<'info> {
    #[account(
        init,
        payer = authority,
        space = 8 + VolatilityStats::LEN
    )]
    pub volatility_stats: Account<'info, VolatilityStats>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct UpdateVolatility<'info> {
    #[account(
        mut,
        has_one = authority @ OracleError::InvalidAuthority,
    )]
    pub volatility_stats: Account<'info, VolatilityStats>,

    pub authority: Signer<'info>,

    pub price_update: Account<'info, PriceUpdateV2>,
}

#[account]
pub struct VolatilityStats {
    pub authority: Pubkey,
    pub last_price: u64,            // fixed-point spot, PRICE_SCALE
    pub mean: f64,                  // mean of log-returns
    pub m2: f64,                    // running sum of squared deviations
    pub count: u64,                 // samples ingested (first carries no return)
    pub annualized_volatility: f64,
}

impl VolatilityStats {
    pub const LEN: usize = 32 + 8 + 8 + 8 + 8 + 8;
}

#[event]
pub struct VolatilityInitialized {
    pub stats: Pubkey,
    pub authority: Pubkey,
    pub timestamp: i64,
}

#[event]
pub struct VolatilityUpdated {
    pub stats: Pubkey,
    pub last_price: u64,
    pub count: u64,
    pub annualized_volatility: f64,
    pub timestamp: i64,
}

#[error_code]
pub enum OracleError {
    #[msg("Invalid Pyth price account")]
    InvalidPythAccount,

    #[msg("No price is available from Pyth")]
    NoPriceAvailable,

    #[msg("Invalid price data")]
    InvalidPriceData,

    #[msg("Invalid authority")]
    InvalidAuthority,
}
