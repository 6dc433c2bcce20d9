use anchor_lang::prelude::*;
use anchor_spl::associated_token::AssociatedToken;
use anchor_spl::token::{self, Burn, Mint, MintTo, Token, TokenAccount, Transfer};
use volatility_oracle::VolatilityStats;

declare_id!("BzzNhUCYn1Prbts4Pw1zHKEvyRpC8dX9VNocT7sYUnaV");

// Perps Engine keeps one volatility position per owner, margined in USDC
// and mirrored by a synthetic vVOL token minted from a program PDA.
#[program]
pub mod perps_engine {
    use super::*;

    /// Create the vVOL mint (its own mint and freeze authority) and its
    /// bookkeeping account.
    pub fn init_synthetic_mint(ctx: Context<InitSyntheticMint>) -> Result<()> {
        ctx.accounts.synthetic_mint.bump = ctx.bumps.synthetic_mint;
        Ok(())
    }

    /// Record a custom vault token account for collateral custody.
    pub fn set_vault(ctx: Context<SetVault>) -> Result<()> {
        let vault_config = &mut ctx.accounts.vault_config;
        vault_config.custom_vault = ctx.accounts.custom_vault.key();
        vault_config.bump = ctx.bumps.vault_config;

        msg!("Vault config set to custom vault: {}", vault_config.custom_vault);
        Ok(())
    }

    pub fn open_position(ctx: Context<OpenPosition>, direction: Side, margin: u64) -> Result<()> {
        require!(margin > 0, PerpError::BadMargin);

        if let Some(vault_config) = &ctx.accounts.vault_config {
            require!(
                vault_config.custom_vault == ctx.accounts.vault.key(),
                PerpError::InvalidVault
            );
        }

        require!(
            !ctx.accounts.position.is_active,
            PerpError::PositionAlreadyExists
        );

        let entry_vol = ctx.accounts.volatility_stats.annualized_volatility;
        let timestamp = Clock::get()?.unix_timestamp;

        let pos = &mut ctx.accounts.position;
        pos.owner = ctx.accounts.owner.key();
        pos.direction = direction;
        pos.entry_vol = entry_vol;
        pos.size = margin; // 1:1 notional
        pos.margin = margin;
        pos.bump = ctx.bumps.position;
        pos.created_at = timestamp;
        pos.is_active = true;

        token::transfer(
            CpiContext::new(
                ctx.accounts.token_program.to_account_info(),
                Transfer {
                    from: ctx.accounts.user_usdc.to_account_info(),
                    to: ctx.accounts.vault.to_account_info(),
                    authority: ctx.accounts.owner.to_account_info(),
                },
            ),
            margin,
        )?;

        let synthetic_bump = ctx.bumps.synthetic_mint;
        let seeds: &[&[u8]] = &[b"synthetic_mint_token".as_ref(), &[synthetic_bump]];
        let signer_seeds = &[&seeds[..]];

        token::mint_to(
            CpiContext::new_with_signer(
                ctx.accounts.token_program.to_account_info(),
                MintTo {
                    mint: ctx.accounts.synthetic_mint.to_account_info(),
                    to: ctx.accounts.user_vvol.to_account_info(),
                    authority: ctx.accounts.synthetic_mint.to_account_info(),
                },
                signer_seeds,
            ),
            ctx.accounts.position.size,
        )?;

        emit!(PositionOpened {
            owner: ctx.accounts.owner.key(),
            position: ctx.accounts.position.key(),
            direction,
            entry_vol,
            size: margin,
            margin,
            timestamp,
        });

        Ok(())
    }

    /// Settle the owner's position against the current oracle reading.
    /// `check_token_balance` additionally requires and burns the vVOL
    /// backing the position.
    pub fn close_position(ctx: Context<ClosePosition>, check_token_balance: bool) -> Result<()> {
        if let Some(vault_config) = &ctx.accounts.vault_config {
            require!(
                vault_config.custom_vault == ctx.accounts.vault.key(),
                PerpError::InvalidVault
            );
        }

        let current_vol = ctx.accounts.volatility_stats.annualized_volatility;
        let timestamp = Clock::get()?.unix_timestamp;

        let position_key = ctx.accounts.position.key();
        let owner_key = ctx.accounts.owner.key();

        let pos = &mut ctx.accounts.position;
        let direction = pos.direction;
        let entry_vol = pos.entry_vol;
        let size = pos.size;
        let margin = pos.margin;

        let pnl = position_pnl(direction, entry_vol, current_vol, size);

        if check_token_balance {
            let user_token_balance = ctx.accounts.user_vvol.amount;
            if user_token_balance < size {
                msg!("Insufficient token balance: {} < {}", user_token_balance, size);
                return Err(PerpError::InsufficientTokens.into());
            }

            let burn_amount = std::cmp::min(size, user_token_balance);
            if burn_amount > 0 {
                let synthetic_bump = ctx.bumps.synthetic_mint;
                let seeds = &[b"synthetic_mint_token".as_ref(), &[synthetic_bump]];
                let signer_seeds = &[&seeds[..]];

                token::burn(
                    CpiContext::new_with_signer(
                        ctx.accounts.token_program.to_account_info(),
                        Burn {
                            mint: ctx.accounts.synthetic_mint.to_account_info(),
                            from: ctx.accounts.user_vvol.to_account_info(),
                            authority: ctx.accounts.synthetic_mint.to_account_info(),
                        },
                        signer_seeds,
                    ),
                    burn_amount,
                )?;
                msg!("Burned {} vVOL", burn_amount);
            }
        }

        let payout = settlement_payout(margin, pnl);
        if payout > 0 {
            // TODO: route the payout once vault custody moves to a program
            // PDA; a custom vault cannot be debited without its owner's
            // signature, so the transfer stays deferred.
            msg!("Settlement payout due: {}", payout);
        }

        pos.is_active = false;

        emit!(PositionClosed {
            owner: owner_key,
            position: position_key,
            direction,
            entry_vol,
            exit_vol: current_vol,
            size,
            margin,
            pnl,
            payout,
            timestamp,
        });

        Ok(())
    }
}

/// Signed PnL of a position over the volatility move, in vault base units.
pub fn position_pnl(direction: Side, entry_vol: f64, exit_vol: f64, size: u64) -> i64 {
    let delta = exit_vol - entry_vol;
    let pnl = match direction {
        Side::Long => delta * size as f64,
        Side::Short => -delta * size as f64,
    };
    pnl as i64
}

/// Margin plus PnL, clamped at zero: losses stop at the posted margin.
pub fn settlement_payout(margin: u64, pnl: i64) -> u64 {
    let pay = margin as i64 + pnl;
    if pay < 0 {
        0
    } else {
        pay as u64
    }
}

#[derive(Accounts)]
pub struct InitSyntheticMint<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,

    #[account(
        init,
        payer = payer,
        seeds = [b"synthetic_mint_token"],
        bump,
        mint::decimals = 6,
        mint::authority = synthetic_mint_token,
        mint::freeze_authority = synthetic_mint_token,
    )]
    pub synthetic_mint_token: Account<'info, Mint>,

    #[account(
        init,
        payer = payer,
        space = 8 + SyntheticMint::LEN,
        seeds = [b"synthetic_mint"],
        bump,
    )]
    pub synthetic_mint: Account<'info, SyntheticMint>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    pub rent: Sysvar<'info, Rent>,
}

#[derive(Accounts)]
pub struct SetVault<'info> {
    #[account(mut)]
    pub authority: Signer<'info>,

    #[account(
        init_if_needed,
        payer = authority,
        space = 8 + VaultConfig::LEN,
        seeds = [b"vault_config"],
        bump,
    )]
    pub vault_config: Account<'info, VaultConfig>,

    /// The token account to use as the vault.
    pub custom_vault: Account<'info, TokenAccount>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
#[instruction(direction: Side)]
pub struct OpenPosition<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(mut)]
    pub user_usdc: Account<'info, TokenAccount>,

    #[account(mut)]
    pub vault: Account<'info, TokenAccount>,

    #[account(
        init_if_needed,
        payer = owner,
        space = 8 + Position::LEN,
        seeds = [b"position", owner.key().as_ref()],
        bump
    )]
    pub position: Account<'info, Position>,

    #[account(
        mut,
        seeds = [b"synthetic_mint_token"],
        bump,
    )]
    pub synthetic_mint: Account<'info, Mint>,

    /// Owner's vVOL ATA, created on first use.
    #[account(
        init_if_needed,
        payer = owner,
        associated_token::mint = synthetic_mint,
        associated_token::authority = owner,
    )]
    pub user_vvol: Account<'info, TokenAccount>,

    /// The stats account maintained by the volatility oracle program.
    pub volatility_stats: Account<'info, VolatilityStats>,

    /// Optional custody override; when present the passed vault must match.
    #[account(
        seeds = [b"vault_config"],
        bump,
    )]
    pub vault_config: Option<Account<'info, VaultConfig>>,

    pub token_program: Program<'info, Token>,
    pub associated_token_program: Program<'info, AssociatedToken>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
#[instruction(check_token_balance: bool)]
pub struct ClosePosition<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(mut)]
    pub user_usdc: Account<'info, TokenAccount>,

    #[account(mut)]
    pub vault: Account<'info, TokenAccount>,

    #[account(
        mut,
        seeds = [b"position", owner.key().as_ref()],
        bump = position.bump,
        has_one = owner,
        constraint = position.is_active @ PerpError::NoActivePosition
    )]
    pub position: Account<'info, Position>,

    #[account(
        mut,
        seeds = [b"synthetic_mint_token"],
        bump,
    )]
    pub synthetic_mint: Account<'info, Mint>,

    #[account(
        mut,
        associated_token::mint = synthetic_mint,
        associated_token::authority = owner,
    )]
    pub user_vvol: Account<'info, TokenAccount>,

    /// The stats account maintained by the volatility oracle program.
    pub volatility_stats: Account<'info, VolatilityStats>,

    /// Optional custody override; when present the passed vault must match.
    #[account(
        seeds = [b"vault_config"],
        bump,
    )]
    pub vault_config: Option<Account<'info, VaultConfig>>,

    pub token_program: Program<'info, Token>,
}

#[account]
pub struct Position {
    pub owner: Pubkey,
    pub direction: Side,
    pub entry_vol: f64,
    pub size: u64,
    pub margin: u64,
    pub bump: u8,
    pub created_at: i64,
    pub is_active: bool,
}

impl Position {
    pub const LEN: usize = 32 + 1 + 8 + 8 + 8 + 1 + 8 + 1;
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

#[account]
pub struct SyntheticMint {
    pub bump: u8,
}

impl SyntheticMint {
    pub const LEN: usize = 1;
}

#[account]
pub struct VaultConfig {
    pub custom_vault: Pubkey,
    pub bump: u8,
}

impl VaultConfig {
    pub const LEN: usize = 32 + 1;
}

#[event]
pub struct PositionOpened {
    pub owner: Pubkey,
    pub position: Pubkey,
    pub direction: Side,
    pub entry_vol: f64,
    pub size: u64,
    pub margin: u64,
    pub timestamp: i64,
}

#[event]
pub struct PositionClosed {
    pub owner: Pubkey,
    pub position: Pubkey,
    pub direction: Side,
    pub entry_vol: f64,
    pub exit_vol: f64,
    pub size: u64,
    pub margin: u64,
    pub pnl: i64,
    pub payout: u64,
    pub timestamp: i64,
}

#[error_code]
pub enum PerpError {
    #[msg("Position already open")]
    ExistingPosition,
    #[msg("No active position")]
    NoActivePosition,
    #[msg("Insufficient margin")]
    BadMargin,
    #[msg("Oracle stale / unavailable")]
    OracleStale,
    #[msg("Invalid vault. The provided vault does not match the configured vault.")]
    InvalidVault,
    #[msg("Insufficient tokens to burn")]
    InsufficientTokens,
    #[msg("Insufficient vault balance")]
    InsufficientVaultBalance,
    #[msg("Position already active")]
    PositionAlreadyExists,
}
