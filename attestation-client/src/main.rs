use std::path::PathBuf;

use anyhow::{Context, Result};
use attestation_client::{input::AttestationInput, types::Environment};
use nitro_attestation::{EnclaveAttestationVerifier, TrustAnchorProvider};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let env = Environment::from_env();

    // JSON logs for staging/production, regular format for development
    if env.json_logs() {
        fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    } else {
        fmt().with_env_filter(EnvFilter::from_default_env()).init();
    }

    info!("Starting attestation client in {:?} environment", env);

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| env.attestation_doc_path())
        .context("No attestation document: pass a path or set ATTESTATION_DOC_PATH")?;
    let input = AttestationInput::read(&path, env.attestation_doc_base64())?;

    let provider = TrustAnchorProvider::new(env.trust_anchor_config());
    let trust_anchor = provider
        .trust_anchor()
        .await
        .context("Failed to acquire trust anchor")?;

    let verifier = EnclaveAttestationVerifier::new(trust_anchor);
    let identity = input
        .verify(&verifier)
        .with_context(|| format!("Attestation document {} rejected", path.display()))?;

    info!(module_id = %identity.module_id, "✅ Attestation document verified");
    println!("{}", serde_json::to_string_pretty(&identity)?);

    Ok(())
}
