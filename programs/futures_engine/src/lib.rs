use anchor_lang::prelude::*;
use anchor_spl::associated_token::AssociatedToken;
use anchor_spl::token::{self, Burn, Mint, MintTo, Token, TokenAccount, Transfer};
use volatility_oracle::VolatilityStats;

declare_id!("BUZNJFxDUAK4yzkrThuBUtgP4so9dwxtHGStYNjPbr41");

/// Volatility readings are carried as integer "vol points" at this scale.
pub const VOL_POINT_SCALE: u64 = 1_000;

/// Fee ceiling in basis points.
pub const MAX_FEE_BPS: u16 = 10_000;

/// USDC charged per vol point, per token. 0.1 USDC at 6 decimals.
pub const DEFAULT_USDC_PER_VOL_POINT: u64 = 100_000;

pub const MAX_TOKEN_NAME_LEN: usize = 64;
pub const MAX_TOKEN_SYMBOL_LEN: usize = 16;

// Futures Engine mints a USDC-collateralized futures token whose entry and
// exit values are read from the volatility oracle.
#[program]
pub mod futures_engine {
    use super::*;

    /// Create the futures mint, the config PDA and the collateral pool.
    /// The oracle must already carry a positive volatility reading.
    pub fn initialize(
        ctx: Context<Initialize>,
        token_name: String,
        token_symbol: String,
        fee_bps: u16,
    ) -> Result<()> {
        require!(fee_bps <= MAX_FEE_BPS, FuturesError::InvalidFeePercentage);
        require!(
            token_name.len() <= MAX_TOKEN_NAME_LEN && token_symbol.len() <= MAX_TOKEN_SYMBOL_LEN,
            FuturesError::InvalidTokenMetadata
        );

        let volatility = ctx.accounts.oracle.annualized_volatility;
        msg!("Current volatility: {}", volatility);
        require!(volatility > 0.0, FuturesError::InvalidOracleData);

        let token_config = &mut ctx.accounts.token_config;
        token_config.authority = ctx.accounts.authority.key();
        token_config.token_mint = ctx.accounts.token_mint.key();
        token_config.usdc_mint = ctx.accounts.usdc_mint.key();
        token_config.fee_destination = ctx.accounts.fee_destination.key();
        token_config.collateral_pool = ctx.accounts.collateral_pool.key();
        token_config.collateral_pool_bump = ctx.bumps.collateral_pool;
        token_config.token_name = token_name;
        token_config.token_symbol = token_symbol;
        token_config.fee_bps = fee_bps;
        token_config.oracle = ctx.accounts.oracle.key();
        token_config.total_tokens_outstanding = 0;
        token_config.usdc_per_vol_point = DEFAULT_USDC_PER_VOL_POINT;
        token_config.bump = ctx.bumps.token_config;

        msg!("Futures config initialized: {}", token_config.token_name);

        Ok(())
    }

    /// Mint futures tokens against USDC collateral at the current
    /// volatility reading. Collateral plus fee must be covered up front.
    pub fn mint_tokens(ctx: Context<MintTokens>, amount: u64) -> Result<()> {
        require!(amount > 0, FuturesError::InvalidAmount);

        let current_volatility = ctx.accounts.oracle.annualized_volatility;
        msg!("Current volatility: {}", current_volatility);
        require!(current_volatility > 0.0, FuturesError::InvalidOracleData);

        let usdc_per_vol = ctx.accounts.token_config.usdc_per_vol_point;
        let points = vol_points(current_volatility);

        let usdc_required =
            required_usdc(amount, points, usdc_per_vol).ok_or(FuturesError::MathOverflow)?;
        let fee = fee_amount(usdc_required, ctx.accounts.token_config.fee_bps)
            .ok_or(FuturesError::MathOverflow)?;
        let total_payment = usdc_required
            .checked_add(fee)
            .ok_or(FuturesError::MathOverflow)?;

        msg!("USDC required: {}, fee: {}", usdc_required, fee);

        require!(
            ctx.accounts.user_usdc_account.amount >= total_payment,
            FuturesError::InsufficientBalance
        );

        token::transfer(
            CpiContext::new(
                ctx.accounts.token_program.to_account_info(),
                Transfer {
                    from: ctx.accounts.user_usdc_account.to_account_info(),
                    to: ctx.accounts.fee_destination.to_account_info(),
                    authority: ctx.accounts.user.to_account_info(),
                },
            ),
            fee,
        )?;

        token::transfer(
            CpiContext::new(
                ctx.accounts.token_program.to_account_info(),
                Transfer {
                    from: ctx.accounts.user_usdc_account.to_account_info(),
                    to: ctx.accounts.collateral_pool.to_account_info(),
                    authority: ctx.accounts.user.to_account_info(),
                },
            ),
            usdc_required,
        )?;

        let token_mint_key = ctx.accounts.token_mint.key();
        let config_seeds = &[
            b"token_config".as_ref(),
            token_mint_key.as_ref(),
            &[ctx.accounts.token_config.bump],
        ];
        let signer = &[&config_seeds[..]];

        token::mint_to(
            CpiContext::new_with_signer(
                ctx.accounts.token_program.to_account_info(),
                MintTo {
                    mint: ctx.accounts.token_mint.to_account_info(),
                    to: ctx.accounts.user_token_account.to_account_info(),
                    authority: ctx.accounts.token_config.to_account_info(),
                },
                signer,
            ),
            amount,
        )?;

        ctx.accounts.token_config.total_tokens_outstanding = ctx
            .accounts
            .token_config
            .total_tokens_outstanding
            .checked_add(amount)
            .ok_or(FuturesError::MathOverflow)?;

        let user_position = &mut ctx.accounts.user_position;
        if user_position.owner == Pubkey::default() {
            user_position.owner = ctx.accounts.user.key();
            user_position.bump = ctx.bumps.user_position;
        }
        user_position.entry_volatility = current_volatility;
        user_position.tokens_minted = user_position
            .tokens_minted
            .checked_add(amount)
            .ok_or(FuturesError::MathOverflow)?;
        user_position.usdc_collateral = user_position
            .usdc_collateral
            .checked_add(usdc_required)
            .ok_or(FuturesError::MathOverflow)?;
        user_position.mint_timestamp = Clock::get()?.unix_timestamp;

        emit!(FuturesMinted {
            token_config: ctx.accounts.token_config.key(),
            user: ctx.accounts.user.key(),
            amount,
            usdc_collateral: usdc_required,
            fee,
            entry_volatility: current_volatility,
        });

        Ok(())
    }

    /// Burn futures tokens and pay out collateral adjusted for the
    /// volatility move since entry.
    pub fn redeem_tokens(ctx: Context<RedeemTokens>, amount: u64) -> Result<()> {
        require!(amount > 0, FuturesError::InvalidAmount);
        require!(
            ctx.accounts.user_token_account.amount >= amount,
            FuturesError::InsufficientTokens
        );
        require!(
            ctx.accounts.user_position.tokens_minted >= amount,
            FuturesError::InsufficientTokens
        );

        let current_volatility = ctx.accounts.oracle.annualized_volatility;
        let entry_volatility = ctx.accounts.user_position.entry_volatility;
        msg!(
            "Entry volatility: {}, current volatility: {}",
            entry_volatility,
            current_volatility
        );

        let usdc_per_vol = ctx.accounts.token_config.usdc_per_vol_point;
        let value = redemption_value(
            amount,
            vol_points(entry_volatility),
            vol_points(current_volatility),
            usdc_per_vol,
        )
        .ok_or(FuturesError::MathOverflow)?;

        let fee = fee_amount(value, ctx.accounts.token_config.fee_bps)
            .ok_or(FuturesError::MathOverflow)?;
        let final_amount = value.checked_sub(fee).ok_or(FuturesError::MathOverflow)?;

        msg!("Redemption value: {}, fee: {}", value, fee);

        require!(
            ctx.accounts.collateral_pool.amount >= final_amount,
            FuturesError::InsufficientBalance
        );

        token::burn(
            CpiContext::new(
                ctx.accounts.token_program.to_account_info(),
                Burn {
                    mint: ctx.accounts.token_mint.to_account_info(),
                    from: ctx.accounts.user_token_account.to_account_info(),
                    authority: ctx.accounts.user.to_account_info(),
                },
            ),
            amount,
        )?;

        let token_mint_key = ctx.accounts.token_mint.key();
        let config_seeds = &[
            b"token_config".as_ref(),
            token_mint_key.as_ref(),
            &[ctx.accounts.token_config.bump],
        ];
        let signer = &[&config_seeds[..]];

        if fee > 0 {
            token::transfer(
                CpiContext::new_with_signer(
                    ctx.accounts.token_program.to_account_info(),
                    Transfer {
                        from: ctx.accounts.collateral_pool.to_account_info(),
                        to: ctx.accounts.fee_destination.to_account_info(),
                        authority: ctx.accounts.token_config.to_account_info(),
                    },
                    signer,
                ),
                fee,
            )?;
        }

        token::transfer(
            CpiContext::new_with_signer(
                ctx.accounts.token_program.to_account_info(),
                Transfer {
                    from: ctx.accounts.collateral_pool.to_account_info(),
                    to: ctx.accounts.user_usdc_account.to_account_info(),
                    authority: ctx.accounts.token_config.to_account_info(),
                },
                signer,
            ),
            final_amount,
        )?;

        ctx.accounts.token_config.total_tokens_outstanding = ctx
            .accounts
            .token_config
            .total_tokens_outstanding
            .checked_sub(amount)
            .ok_or(FuturesError::MathOverflow)?;

        ctx.accounts.user_position.tokens_minted = ctx
            .accounts
            .user_position
            .tokens_minted
            .checked_sub(amount)
            .ok_or(FuturesError::MathOverflow)?;

        // Release collateral proportionally to the share just redeemed.
        let collateral_reduction = ctx
            .accounts
            .user_position
            .usdc_collateral
            .checked_mul(amount)
            .ok_or(FuturesError::MathOverflow)?
            .checked_div(ctx.accounts.user_position.tokens_minted + amount)
            .unwrap_or(ctx.accounts.user_position.usdc_collateral);

        ctx.accounts.user_position.usdc_collateral = ctx
            .accounts
            .user_position
            .usdc_collateral
            .checked_sub(collateral_reduction)
            .ok_or(FuturesError::MathOverflow)?;

        emit!(FuturesRedeemed {
            token_config: ctx.accounts.token_config.key(),
            user: ctx.accounts.user.key(),
            amount,
            payout: final_amount,
            fee,
            exit_volatility: current_volatility,
        });

        Ok(())
    }

    pub fn update_fee(ctx: Context<UpdateFee>, new_fee_bps: u16) -> Result<()> {
        require!(new_fee_bps <= MAX_FEE_BPS, FuturesError::InvalidFeePercentage);

        ctx.accounts.token_config.fee_bps = new_fee_bps;
        msg!("Fee updated to: {}", new_fee_bps);

        emit!(FeeUpdated {
            token_config: ctx.accounts.token_config.key(),
            fee_bps: new_fee_bps,
        });

        Ok(())
    }
}

pub fn vol_points(volatility: f64) -> u64 {
    (volatility * VOL_POINT_SCALE as f64) as u64
}

/// Collateral required to mint `amount` tokens at `points` volatility.
pub fn required_usdc(amount: u64, points: u64, usdc_per_vol_point: u64) -> Option<u64> {
    amount
        .checked_mul(points)?
        .checked_mul(usdc_per_vol_point)?
        .checked_div(VOL_POINT_SCALE)
}

pub fn fee_amount(value: u64, fee_bps: u16) -> Option<u64> {
    value
        .checked_mul(fee_bps as u64)?
        .checked_div(MAX_FEE_BPS as u64)
}

/// Redemption value of `amount` tokens: entry value plus profit when
/// volatility rose, minus loss when it fell. A loss never wipes the
/// position below one base unit.
pub fn redemption_value(
    amount: u64,
    entry_vol_points: u64,
    current_vol_points: u64,
    usdc_per_vol_point: u64,
) -> Option<u64> {
    let base_value = required_usdc(amount, entry_vol_points, usdc_per_vol_point)?;

    if current_vol_points > entry_vol_points {
        let diff = current_vol_points.checked_sub(entry_vol_points)?;
        let profit = usdc_per_vol_point
            .checked_mul(amount)?
            .checked_mul(diff)?
            .checked_div(VOL_POINT_SCALE)?;
        base_value.checked_add(profit)
    } else if current_vol_points < entry_vol_points {
        let diff = entry_vol_points.checked_sub(current_vol_points)?;
        let loss = usdc_per_vol_point
            .checked_mul(amount)?
            .checked_mul(diff)?
            .checked_div(VOL_POINT_SCALE)?;
        if loss >= base_value {
            Some(1)
        } else {
            base_value.checked_sub(loss)
        }
    } else {
        Some(base_value)
    }
}

#[derive(Accounts)]
#[instruction(token_name: String, token_symbol: String, fee_bps: u16)]
pub struct Initialize<'info> {
    #[account(mut)]
    pub authority: Signer<'info>,

    #[account(
        init,
        payer = authority,
        mint::decimals = 6,
        mint::authority = token_config,
    )]
    pub token_mint: Account<'info, Mint>,

    #[account(
        constraint = usdc_mint.decimals == 6 @ FuturesError::InvalidOracleData,
    )]
    pub usdc_mint: Account<'info, Mint>,

    /// Existing USDC account owned by the authority; receives fees.
    #[account(
        mut,
        constraint = fee_destination.mint == usdc_mint.key() @ FuturesError::InvalidOracleData,
        constraint = fee_destination.owner == authority.key() @ FuturesError::Unauthorized,
    )]
    pub fee_destination: Account<'info, TokenAccount>,

    #[account(
        init_if_needed,
        payer = authority,
        seeds = [b"collateral_pool", token_mint.key().as_ref()],
        bump,
        token::mint = usdc_mint,
        token::authority = token_config,
    )]
    pub collateral_pool: Account<'info, TokenAccount>,

    pub oracle: Account<'info, VolatilityStats>,

    #[account(
        init,
        payer = authority,
        space = 8 + TokenConfig::LEN,
        seeds = [b"token_config", token_mint.key().as_ref()],
        bump
    )]
    pub token_config: Account<'info, TokenConfig>,

    pub token_program: Program<'info, Token>,
    pub associated_token_program: Program<'info, AssociatedToken>,
    pub system_program: Program<'info, System>,
    pub rent: Sysvar<'info, Rent>,
}

#[derive(Accounts)]
#[instruction(amount: u64)]
pub struct MintTokens<'info> {
    #[account(mut)]
    pub user: Signer<'info>,

    #[account(
        mut,
        constraint = user_usdc_account.owner == user.key() @ FuturesError::Unauthorized,
        constraint = user_usdc_account.mint == token_config.usdc_mint @ FuturesError::InvalidOracleData,
    )]
    pub user_usdc_account: Account<'info, TokenAccount>,

    #[account(
        mut,
        constraint = fee_destination.key() == token_config.fee_destination @ FuturesError::Unauthorized,
    )]
    pub fee_destination: Account<'info, TokenAccount>,

    #[account(
        mut,
        seeds = [b"collateral_pool", token_mint.key().as_ref()],
        bump = token_config.collateral_pool_bump,
        constraint = collateral_pool.key() == token_config.collateral_pool @ FuturesError::Unauthorized,
    )]
    pub collateral_pool: Account<'info, TokenAccount>,

    #[account(
        init_if_needed,
        payer = user,
        associated_token::mint = token_mint,
        associated_token::authority = user,
    )]
    pub user_token_account: Account<'info, TokenAccount>,

    #[account(
        mut,
        constraint = token_mint.key() == token_config.token_mint @ FuturesError::InvalidOracleData,
    )]
    pub token_mint: Account<'info, Mint>,

    #[account(
        mut,
        seeds = [b"token_config", token_mint.key().as_ref()],
        bump = token_config.bump,
    )]
    pub token_config: Account<'info, TokenConfig>,

    #[account(
        init_if_needed,
        payer = user,
        space = 8 + UserPosition::LEN,
        seeds = [b"user_position", user.key().as_ref(), token_mint.key().as_ref()],
        bump,
    )]
    pub user_position: Account<'info, UserPosition>,

    #[account(
        constraint = oracle.key() == token_config.oracle @ FuturesError::InvalidOracleData,
    )]
    pub oracle: Account<'info, VolatilityStats>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    pub associated_token_program: Program<'info, AssociatedToken>,
    pub rent: Sysvar<'info, Rent>,
}

#[derive(Accounts)]
#[instruction(amount: u64)]
pub struct RedeemTokens<'info> {
    #[account(mut)]
    pub user: Signer<'info>,

    #[account(
        mut,
        constraint = user_usdc_account.owner == user.key() @ FuturesError::Unauthorized,
        constraint = user_usdc_account.mint == token_config.usdc_mint @ FuturesError::InvalidOracleData,
    )]
    pub user_usdc_account: Account<'info, TokenAccount>,

    #[account(
        mut,
        constraint = user_token_account.owner == user.key() @ FuturesError::Unauthorized,
        constraint = user_token_account.mint == token_mint.key() @ FuturesError::InvalidOracleData,
    )]
    pub user_token_account: Account<'info, TokenAccount>,

    #[account(
        mut,
        constraint = fee_destination.key() == token_config.fee_destination @ FuturesError::Unauthorized,
    )]
    pub fee_destination: Account<'info, TokenAccount>,

    #[account(
        mut,
        seeds = [b"collateral_pool", token_mint.key().as_ref()],
        bump = token_config.collateral_pool_bump,
        constraint = collateral_pool.key() == token_config.collateral_pool @ FuturesError::Unauthorized,
        constraint = collateral_pool.mint == token_config.usdc_mint @ FuturesError::InvalidOracleData,
    )]
    pub collateral_pool: Account<'info, TokenAccount>,

    #[account(
        mut,
        constraint = token_mint.key() == token_config.token_mint @ FuturesError::InvalidOracleData,
    )]
    pub token_mint: Account<'info, Mint>,

    #[account(
        mut,
        seeds = [b"token_config", token_mint.key().as_ref()],
        bump = token_config.bump,
    )]
    pub token_config: Account<'info, TokenConfig>,

    #[account(
        mut,
        seeds = [b"user_position", user.key().as_ref(), token_mint.key().as_ref()],
        bump = user_position.bump,
        constraint = user_position.owner == user.key() @ FuturesError::Unauthorized,
    )]
    pub user_position: Account<'info, UserPosition>,

    #[account(
        constraint = oracle.key() == token_config.oracle @ FuturesError::InvalidOracleData,
    )]
    pub oracle: Account<'info, VolatilityStats>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
#[instruction(new_fee_bps: u16)]
pub struct UpdateFee<'info> {
    #[account(
        constraint = authority.key() == token_config.authority @ FuturesError::Unauthorized,
    )]
    pub authority: Signer<'info>,

    #[account(
        mut,
        seeds = [b"token_config", token_mint.key().as_ref()],
        bump = token_config.bump,
    )]
    pub token_config: Account<'info, TokenConfig>,

    #[account(
        constraint = token_mint.key() == token_config.token_mint @ FuturesError::InvalidOracleData,
    )]
    pub token_mint: Account<'info, Mint>,
}

#[account]
pub struct TokenConfig {
    pub authority: Pubkey,
    pub token_mint: Pubkey,
    pub usdc_mint: Pubkey,
    pub fee_destination: Pubkey,
    pub collateral_pool: Pubkey,
    pub token_name: String,
    pub token_symbol: String,
    pub fee_bps: u16,
    pub oracle: Pubkey,
    pub total_tokens_outstanding: u64,
    pub usdc_per_vol_point: u64,
    pub collateral_pool_bump: u8,
    pub bump: u8,
}

impl TokenConfig {
    pub const LEN: usize = 32 * 6
        + (4 + MAX_TOKEN_NAME_LEN)
        + (4 + MAX_TOKEN_SYMBOL_LEN)
        + 2
        + 8
        + 8
        + 1
        + 1;
}

#[account]
pub struct UserPosition {
    pub owner: Pubkey,
    pub entry_volatility: f64,
    pub tokens_minted: u64,
    pub usdc_collateral: u64,
    pub mint_timestamp: i64,
    pub bump: u8,
}

impl UserPosition {
    pub const LEN: usize = 32 + 8 + 8 + 8 + 8 + 1;
}

#[event]
pub struct FuturesMinted {
    pub token_config: Pubkey,
    pub user: Pubkey,
    pub amount: u64,
    pub usdc_collateral: u64,
    pub fee: u64,
    pub entry_volatility: f64,
}

#[event]
pub struct FuturesRedeemed {
    pub token_config: Pubkey,
    pub user: Pubkey,
    pub amount: u64,
    pub payout: u64,
    pub fee: u64,
    pub exit_volatility: f64,
}

#[event]
pub struct FeeUpdated {
    pub token_config: Pubkey,
    pub fee_bps: u16,
}

#[error_code]
pub enum FuturesError {
    #[msg("Oracle account data is stale or invalid")]
    OracleStale,

    #[msg("Insufficient USDC balance")]
    InsufficientBalance,

    #[msg("Invalid fee percentage, must be between 0 and 10000")]
    InvalidFeePercentage,

    #[msg("Only authority can perform this action")]
    Unauthorized,

    #[msg("Invalid token amount")]
    InvalidAmount,

    #[msg("Math overflow")]
    MathOverflow,

    #[msg("Invalid oracle data or account mismatch")]
    InvalidOracleData,

    #[msg("Position not found")]
    PositionNotFound,

    #[msg("Insufficient tokens to redeem")]
    InsufficientTokens,

    #[msg("Token name or symbol too long")]
    InvalidTokenMetadata,
}
