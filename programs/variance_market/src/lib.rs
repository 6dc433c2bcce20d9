use anchor_lang::prelude::*;
use anchor_spl::token::{self, Burn, Mint, MintTo, Token, TokenAccount, Transfer};
use volatility_oracle::VolatilityStats;

declare_id!("5iC5SMfrykXJe2hkb7toSzirFJhov2XzWuxJvjYUVByx");

/// Strike and realized variance are carried as vol points x100.
pub const VARIANCE_POINT_SCALE: f64 = 100.0;

// Variance Market settles a long/short pair of VAR tokens against the
// realized volatility move recorded by the oracle over one epoch.
#[program]
pub mod variance_market {
    use super::*;

    /// Open the market for one epoch: record the strike, snapshot the
    /// oracle reading and hand both VAR mints to the market PDA.
    pub fn initialize_market(ctx: Context<InitializeMarket>, epoch: u64, strike: u64) -> Result<()> {
        let clock = Clock::get()?;

        let market = &mut ctx.accounts.market;
        market.epoch = epoch;
        market.strike = strike;
        market.realized_variance = 0;
        market.authority = ctx.accounts.authority.key();
        market.usdc_vault = ctx.accounts.usdc_vault.key();
        market.var_long_mint = ctx.accounts.var_long_mint.key();
        market.var_short_mint = ctx.accounts.var_short_mint.key();
        market.volatility_stats = ctx.accounts.volatility_stats.key();
        market.timestamp = clock.unix_timestamp;
        market.bump = ctx.bumps.market;
        market.is_initialized = true;
        market.is_expired = false;
        market.total_deposits = 0;
        market.start_volatility = ctx.accounts.volatility_stats.annualized_volatility;

        token::set_authority(
            CpiContext::new(
                ctx.accounts.token_program.to_account_info(),
                token::SetAuthority {
                    current_authority: ctx.accounts.authority.to_account_info(),
                    account_or_mint: ctx.accounts.var_long_mint.to_account_info(),
                },
            ),
            token::spl_token::instruction::AuthorityType::MintTokens,
            Some(market.key()),
        )?;

        token::set_authority(
            CpiContext::new(
                ctx.accounts.token_program.to_account_info(),
                token::SetAuthority {
                    current_authority: ctx.accounts.authority.to_account_info(),
                    account_or_mint: ctx.accounts.var_short_mint.to_account_info(),
                },
            ),
            token::spl_token::instruction::AuthorityType::MintTokens,
            Some(market.key()),
        )?;

        emit!(MarketInitialized {
            market: market.key(),
            authority: market.authority,
            usdc_vault: market.usdc_vault,
            var_long_mint: market.var_long_mint,
            var_short_mint: market.var_short_mint,
            epoch,
            strike,
            timestamp: clock.unix_timestamp,
            start_volatility: market.start_volatility,
        });

        Ok(())
    }

    /// Deposit USDC and mint the chosen side 1:1 while the market is live.
    pub fn mint_tokens(ctx: Context<MintTokens>, amount: u64, is_long: bool) -> Result<()> {
        let market = &mut ctx.accounts.market;
        require!(!market.is_expired, MarketError::MarketExpired);
        require!(amount > 0, MarketError::InvalidAmount);

        token::transfer(
            CpiContext::new(
                ctx.accounts.token_program.to_account_info(),
                Transfer {
                    from: ctx.accounts.user_usdc.to_account_info(),
                    to: ctx.accounts.usdc_vault.to_account_info(),
                    authority: ctx.accounts.user_authority.to_account_info(),
                },
            ),
            amount,
        )?;

        let epoch_bytes = market.epoch.to_le_bytes();
        let seeds = &[b"market".as_ref(), &epoch_bytes[..], &[market.bump]];
        let signer = &[&seeds[..]];

        let side_mint = if is_long {
            &ctx.accounts.var_long_mint
        } else {
            &ctx.accounts.var_short_mint
        };
        let side_account = if is_long {
            &ctx.accounts.user_var_long
        } else {
            &ctx.accounts.user_var_short
        };

        token::mint_to(
            CpiContext::new_with_signer(
                ctx.accounts.token_program.to_account_info(),
                MintTo {
                    mint: side_mint.to_account_info(),
                    to: side_account.to_account_info(),
                    authority: market.to_account_info(),
                },
                signer,
            ),
            amount,
        )?;

        market.total_deposits = market
            .total_deposits
            .checked_add(amount)
            .ok_or(MarketError::NumberOverflow)?;

        emit!(TokensMinted {
            market: market.key(),
            user: ctx.accounts.user_authority.key(),
            amount,
            is_long,
            total_deposits: market.total_deposits,
        });

        Ok(())
    }

    /// Settle the market once: split the vault between the long side
    /// (paid per point of realized variance above the strike) and the
    /// short side (the remainder), then retire the caller's VAR tokens.
    pub fn redeem(ctx: Context<Redeem>) -> Result<()> {
        let market = &mut ctx.accounts.market;
        require!(!market.is_expired, MarketError::MarketExpired);

        let volatility_stats = &ctx.accounts.volatility_stats;
        let realized_variance = variance_points(volatility_stats.annualized_volatility)
            .checked_sub(variance_points(market.start_volatility))
            .ok_or(MarketError::NumberOverflow)?;

        market.realized_variance = realized_variance;
        market.is_expired = true;

        let (long_payout, short_payout) =
            variance_payouts(realized_variance, market.strike, market.total_deposits)
                .ok_or(MarketError::NumberOverflow)?;

        msg!(
            "Settling epoch {}: realized {} vs strike {}, long {} / short {}",
            market.epoch,
            realized_variance,
            market.strike,
            long_payout,
            short_payout
        );

        let epoch_bytes = market.epoch.to_le_bytes();
        let seeds = &[b"market".as_ref(), &epoch_bytes[..], &[market.bump]];
        let signer = &[&seeds[..]];

        if long_payout > 0 {
            token::transfer(
                CpiContext::new_with_signer(
                    ctx.accounts.token_program.to_account_info(),
                    Transfer {
                        from: ctx.accounts.usdc_vault.to_account_info(),
                        to: ctx.accounts.user_usdc.to_account_info(),
                        authority: market.to_account_info(),
                    },
                    signer,
                ),
                long_payout,
            )?;
        }

        if short_payout > 0 {
            token::transfer(
                CpiContext::new_with_signer(
                    ctx.accounts.token_program.to_account_info(),
                    Transfer {
                        from: ctx.accounts.usdc_vault.to_account_info(),
                        to: ctx.accounts.user_usdc.to_account_info(),
                        authority: market.to_account_info(),
                    },
                    signer,
                ),
                short_payout,
            )?;
        }

        token::burn(
            CpiContext::new(
                ctx.accounts.token_program.to_account_info(),
                Burn {
                    mint: ctx.accounts.var_long_mint.to_account_info(),
                    from: ctx.accounts.user_var_long.to_account_info(),
                    authority: ctx.accounts.user_authority.to_account_info(),
                },
            ),
            ctx.accounts.user_var_long.amount,
        )?;

        token::burn(
            CpiContext::new(
                ctx.accounts.token_program.to_account_info(),
                Burn {
                    mint: ctx.accounts.var_short_mint.to_account_info(),
                    from: ctx.accounts.user_var_short.to_account_info(),
                    authority: ctx.accounts.user_authority.to_account_info(),
                },
            ),
            ctx.accounts.user_var_short.amount,
        )?;

        emit!(MarketRedeemed {
            market: market.key(),
            user: ctx.accounts.user_authority.key(),
            realized_variance,
            strike: market.strike,
            long_payout,
            short_payout,
            total_deposits: market.total_deposits,
        });

        Ok(())
    }
}

pub fn variance_points(volatility: f64) -> u64 {
    (volatility * VARIANCE_POINT_SCALE) as u64
}

/// Split `total_deposits` between the long and short side given the
/// realized variance. Long collects one percent of deposits per point
/// above the strike; shorts keep the rest. None when the long payout
/// alone exceeds the vault.
pub fn variance_payouts(
    realized_variance: u64,
    strike: u64,
    total_deposits: u64,
) -> Option<(u64, u64)> {
    let long_payout = if realized_variance > strike {
        let scaled = ((realized_variance - strike) as u128)
            .checked_mul(total_deposits as u128)?
            .checked_div(100)?;
        u64::try_from(scaled).ok()?
    } else {
        0
    };
    let short_payout = total_deposits.checked_sub(long_payout)?;
    Some((long_payout, short_payout))
}

#[derive(Accounts)]
#[instruction(epoch: u64, strike: u64)]
pub struct InitializeMarket<'info> {
    #[account(
        init,
        payer = authority,
        space = 8 + Market::LEN,
        seeds = [b"market", &epoch.to_le_bytes()[..]],
        bump
    )]
    pub market: Account<'info, Market>,

    #[account(mut)]
    pub authority: Signer<'info>,

    #[account(mut)]
    pub usdc_vault: Account<'info, TokenAccount>,

    #[account(mut)]
    pub var_long_mint: Account<'info, Mint>,

    #[account(mut)]
    pub var_short_mint: Account<'info, Mint>,

    /// The stats account maintained by the volatility oracle program.
    pub volatility_stats: Account<'info, VolatilityStats>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct MintTokens<'info> {
    #[account(
        mut,
        seeds = [b"market", &market.epoch.to_le_bytes()[..]],
        bump = market.bump
    )]
    pub market: Account<'info, Market>,

    pub user_authority: Signer<'info>,

    #[account(mut)]
    pub user_usdc: Account<'info, TokenAccount>,

    #[account(
        mut,
        constraint = usdc_vault.key() == market.usdc_vault @ MarketError::InvalidMarketAccount,
    )]
    pub usdc_vault: Account<'info, TokenAccount>,

    #[account(
        mut,
        constraint = var_long_mint.key() == market.var_long_mint @ MarketError::InvalidMarketAccount,
    )]
    pub var_long_mint: Account<'info, Mint>,

    #[account(
        mut,
        constraint = var_short_mint.key() == market.var_short_mint @ MarketError::InvalidMarketAccount,
    )]
    pub var_short_mint: Account<'info, Mint>,

    #[account(mut)]
    pub user_var_long: Account<'info, TokenAccount>,

    #[account(mut)]
    pub user_var_short: Account<'info, TokenAccount>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct Redeem<'info> {
    #[account(
        mut,
        seeds = [b"market", &market.epoch.to_le_bytes()[..]],
        bump = market.bump
    )]
    pub market: Account<'info, Market>,

    pub user_authority: Signer<'info>,

    #[account(mut)]
    pub user_usdc: Account<'info, TokenAccount>,

    #[account(
        mut,
        constraint = usdc_vault.key() == market.usdc_vault @ MarketError::InvalidMarketAccount,
    )]
    pub usdc_vault: Account<'info, TokenAccount>,

    #[account(
        mut,
        constraint = var_long_mint.key() == market.var_long_mint @ MarketError::InvalidMarketAccount,
    )]
    pub var_long_mint: Account<'info, Mint>,

    #[account(
        mut,
        constraint = var_short_mint.key() == market.var_short_mint @ MarketError::InvalidMarketAccount,
    )]
    pub var_short_mint: Account<'info, Mint>,

    #[account(mut)]
    pub user_var_long: Account<'info, TokenAccount>,

    #[account(mut)]
    pub user_var_short: Account<'info, TokenAccount>,

    /// The stats account maintained by the volatility oracle program.
    #[account(
        constraint = volatility_stats.key() == market.volatility_stats @ MarketError::InvalidMarketAccount,
    )]
    pub volatility_stats: Account<'info, VolatilityStats>,

    pub token_program: Program<'info, Token>,
}

#[account]
pub struct Market {
    pub epoch: u64,
    pub strike: u64,             // vol points x100
    pub realized_variance: u64,  // vol points x100, set at settlement
    pub var_long_mint: Pubkey,
    pub var_short_mint: Pubkey,
    pub usdc_vault: Pubkey,
    pub authority: Pubkey,
    pub volatility_stats: Pubkey,
    pub timestamp: i64,
    pub start_volatility: f64,
    pub bump: u8,
    pub is_initialized: bool,
    pub is_expired: bool,
    pub total_deposits: u64,
}

impl Market {
    pub const LEN: usize = 8 + 8 + 8 + 32 + 32 + 32 + 32 + 32 + 8 + 8 + 1 + 1 + 1 + 8;
}

#[event]
pub struct MarketInitialized {
    pub market: Pubkey,
    pub authority: Pubkey,
    pub usdc_vault: Pubkey,
    pub var_long_mint: Pubkey,
    pub var_short_mint: Pubkey,
    pub epoch: u64,
    pub strike: u64,
    pub timestamp: i64,
    pub start_volatility: f64,
}

#[event]
pub struct TokensMinted {
    pub market: Pubkey,
    pub user: Pubkey,
    pub amount: u64,
    pub is_long: bool,
    pub total_deposits: u64,
}

#[event]
pub struct MarketRedeemed {
    pub market: Pubkey,
    pub user: Pubkey,
    pub realized_variance: u64,
    pub strike: u64,
    pub long_payout: u64,
    pub short_payout: u64,
    pub total_deposits: u64,
}

#[error_code]
pub enum MarketError {
    #[msg("Market is already expired")]
    MarketExpired,

    #[msg("Numeric overflow occurred")]
    NumberOverflow,

    #[msg("Invalid token amount")]
    InvalidAmount,

    #[msg("Account does not match the market configuration")]
    InvalidMarketAccount,
}
