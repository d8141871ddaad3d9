//! Admin transactions against the lending program.
//!
//! Only the token blacklist instruction is exposed. It is signer-authorized
//! by the protocol admin and flips `token_config.blacklisted` to true, which
//! blocks new loans against the token.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    hash::hash,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair},
    signer::Signer,
    transaction::Transaction,
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// PDA seed of the global protocol state account.
pub const PROTOCOL_STATE_SEED: &[u8] = b"protocol_state";

/// PDA seed prefix of per-token config accounts.
pub const TOKEN_CONFIG_SEED: &[u8] = b"token_config";

/// Executes privileged admin actions on-chain.
#[async_trait]
pub trait ChainAdmin: Send + Sync {
    /// Blacklist `token_mint`, returning the transaction signature.
    ///
    /// Failures are reported to the caller and never retried here.
    async fn blacklist_token(&self, token_mint: &str, admin_authority: &str) -> Result<String>;
}

/// Anchor instruction discriminator: first 8 bytes of sha256("global:<name>").
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    let preimage = format!("global:{}", name);
    let digest = hash(preimage.as_bytes()).to_bytes();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Derive the protocol state PDA.
pub fn derive_protocol_state(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[PROTOCOL_STATE_SEED], program_id)
}

/// Derive the token config PDA for a mint.
pub fn derive_token_config(mint: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[TOKEN_CONFIG_SEED, mint.as_ref()], program_id)
}

/// Build the `blacklist_token` instruction.
///
/// Accounts:
/// 0. Protocol state PDA
/// 1. Token config PDA (writable)
/// 2. Admin (signer)
pub fn build_blacklist_instruction(program_id: &Pubkey, mint: &Pubkey, admin: &Pubkey) -> Instruction {
    let (protocol_state, _) = derive_protocol_state(program_id);
    let (token_config, _) = derive_token_config(mint, program_id);

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(protocol_state, false),
            AccountMeta::new(token_config, false),
            AccountMeta::new_readonly(*admin, true),
        ],
        data: instruction_discriminator("blacklist_token").to_vec(),
    }
}

/// Solana implementation of [`ChainAdmin`] signing with the admin keypair.
pub struct SolanaChainAdmin {
    rpc: Arc<RpcClient>,
    program_id: Pubkey,
    admin: Keypair,
}

impl std::fmt::Debug for SolanaChainAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaChainAdmin")
            .field("program_id", &self.program_id)
            .field("admin", &self.admin.pubkey())
            .finish()
    }
}

impl SolanaChainAdmin {
    /// Create an admin client from an already loaded keypair.
    pub fn new(rpc: Arc<RpcClient>, program_id: Pubkey, admin: Keypair) -> Self {
        Self {
            rpc,
            program_id,
            admin,
        }
    }

    /// Create an admin client, loading the keypair from a JSON keypair file.
    pub fn from_keypair_file(
        rpc: Arc<RpcClient>,
        program_id: Pubkey,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let admin = read_keypair_file(path)
            .map_err(|e| anyhow!("Failed to read admin keypair {}: {}", path.display(), e))?;
        Ok(Self::new(rpc, program_id, admin))
    }

    /// Public key of the admin signer.
    pub fn admin_pubkey(&self) -> Pubkey {
        self.admin.pubkey()
    }
}

#[async_trait]
impl ChainAdmin for SolanaChainAdmin {
    #[instrument(skip(self), fields(program = %self.program_id))]
    async fn blacklist_token(&self, token_mint: &str, admin_authority: &str) -> Result<String> {
        let mint = Pubkey::from_str(token_mint)
            .with_context(|| format!("Invalid token mint: {}", token_mint))?;
        let authority = Pubkey::from_str(admin_authority)
            .with_context(|| format!("Invalid admin authority: {}", admin_authority))?;

        if authority != self.admin.pubkey() {
            warn!(
                expected = %self.admin.pubkey(),
                requested = %authority,
                "Admin authority does not match loaded keypair"
            );
            bail!(
                "Admin authority {} does not match signer {}",
                authority,
                self.admin.pubkey()
            );
        }

        let start = Instant::now();
        let instruction = build_blacklist_instruction(&self.program_id, &mint, &authority);
        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .context("Failed to fetch recent blockhash")?;

        let transaction = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&self.admin.pubkey()),
            &[&self.admin],
            blockhash,
        );

        let signature = self
            .rpc
            .send_and_confirm_transaction(&transaction)
            .await
            .context("Blacklist transaction failed")?;

        info!(
            mint = token_mint,
            signature = %signature,
            elapsed_ms = start.elapsed().as_millis(),
            "Token blacklisted on-chain"
        );

        Ok(signature.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminator_is_stable() {
        let a = instruction_discriminator("blacklist_token");
        let b = instruction_discriminator("blacklist_token");
        assert_eq!(a, b);
        assert_ne!(a, instruction_discriminator("unblacklist_token"));
    }

    #[test]
    fn test_build_blacklist_instruction() {
        let program_id = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let admin = Pubkey::new_unique();

        let ix = build_blacklist_instruction(&program_id, &mint, &admin);

        assert_eq!(ix.program_id, program_id);
        assert_eq!(ix.data.len(), 8);
        assert_eq!(ix.accounts.len(), 3);
        assert_eq!(ix.accounts[0].pubkey, derive_protocol_state(&program_id).0);
        assert!(!ix.accounts[0].is_writable);
        assert_eq!(ix.accounts[1].pubkey, derive_token_config(&mint, &program_id).0);
        assert!(ix.accounts[1].is_writable);
        assert!(ix.accounts[2].is_signer);
    }

    #[tokio::test]
    async fn test_rejects_foreign_authority() {
        let rpc = Arc::new(RpcClient::new("http://127.0.0.1:8899".to_string()));
        let admin = SolanaChainAdmin::new(rpc, Pubkey::new_unique(), Keypair::new());
        let other = Pubkey::new_unique().to_string();
        let mint = Pubkey::new_unique().to_string();

        let err = admin.blacklist_token(&mint, &other).await.unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }
}
