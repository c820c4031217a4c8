//! # Invite Ledger
//!
//! In-memory table of single-use invite codes.
//!
//! ## Lifecycle
//! - `Unminted -> Unused`: an admin mints a code through [`InviteStore::create_code`]
//! - `Unused -> Used`: the first [`InviteStore::redeem`] for that code
//! - `Used` is terminal, codes are never deleted and never expire
//!
//! ## Implementation
//!
//! - `DashMap` keyed by code, so lookups and writes only lock one shard
//! - Redemption holds the shard write lock across the lookup and the write, so two
//!   concurrent redemptions of one code resolve to exactly one success
//! - Lives for the process lifetime, lost on restart
//! - Separate processes hold separate ledgers. Running more than one instance
//!   breaks the single-redemption guarantee across instances
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

#[cfg(feature = "verbose")]
use tracing::info;

pub const CODE_LENGTH: usize = 10;

// excludes 0, O, 1 and I
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InviteCode {
    pub code: String,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RedeemError {
    #[error("invite code not found")]
    NotFound,

    #[error("invite code already used")]
    AlreadyUsed,
}

/// Storage seam for invite codes.
#[async_trait]
pub trait InviteStore: Send + Sync {
    /// Mints a fresh, unused code.
    async fn create_code(&self) -> String;

    /// Marks `code` used. Succeeds at most once per code.
    async fn redeem(&self, code: &str) -> Result<(), RedeemError>;

    /// Every known code, oldest first.
    async fn list(&self) -> Vec<InviteCode>;
}

#[derive(Default)]
pub struct InviteLedger {
    codes: DashMap<String, InviteCode>,
}

impl InviteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&self) -> String {
        loop {
            let code = generate_code();

            if let Entry::Vacant(entry) = self.codes.entry(code.clone()) {
                entry.insert(InviteCode {
                    code: code.clone(),
                    used: false,
                    created_at: Utc::now(),
                });

                #[cfg(feature = "verbose")]
                info!("Minted invite code {code}");

                return code;
            }
        }
    }

    fn consume(&self, code: &str) -> Result<(), RedeemError> {
        let mut invite = self.codes.get_mut(code).ok_or(RedeemError::NotFound)?;

        if invite.used {
            return Err(RedeemError::AlreadyUsed);
        }
        invite.used = true;

        #[cfg(feature = "verbose")]
        info!("Redeemed invite code {code}");

        Ok(())
    }
}

#[async_trait]
impl InviteStore for InviteLedger {
    async fn create_code(&self) -> String {
        self.mint()
    }

    async fn redeem(&self, code: &str) -> Result<(), RedeemError> {
        self.consume(code)
    }

    async fn list(&self) -> Vec<InviteCode> {
        let mut invites: Vec<InviteCode> = self
            .codes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        invites.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        invites
    }
}

fn generate_code() -> String {
    let mut rng = rand::rng();

    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
