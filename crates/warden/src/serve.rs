// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `warden serve`: wire the full gateway and run until a shutdown signal.
//!
//! Startup order follows the dependency graph leaf-first: audit, capability
//! signer, stores, classifier/gate, dispatcher, MCP proxy + manager, prompt
//! builder, orchestrator, task loop, heartbeats, bridge transport. Any
//! failure before the event loop starts is fatal (exit code 1).

use std::sync::Arc;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warden_agent::{GatePolicy, HeartbeatRunner, HitlGate, Orchestrator, TaskRunner};
use warden_audit::AuditLogger;
use warden_bridge::BridgeServer;
use warden_capability::TokenSigner;
use warden_config::model::WardenConfig;
use warden_config::{AUDIT_DIR_ENV, CAPABILITY_SECRET_ENV, LLM_API_KEY_ENV};
use warden_core::traits::provider::LlmProvider;
use warden_core::WardenError;
use warden_mcp::{DockerLauncher, DomainProxy, McpManager};
use warden_prompt::{PromptBuilder, SkillCatalog, SoulLoader};
use warden_sandbox::{Dispatcher, DockerCli};
use warden_store::{Database, SessionStore};

use crate::gateway::{BroadcastSink, Gateway};

/// Run the gateway until SIGINT/SIGTERM.
pub async fn run_serve(config: WardenConfig) -> Result<(), WardenError> {
    init_tracing(&config.agent.log_level);
    info!(agent = %config.agent.name, "starting warden serve");

    // Process-wide init values.
    let secret = std::env::var(CAPABILITY_SECRET_ENV)
        .map_err(|_| WardenError::Config(format!("{CAPABILITY_SECRET_ENV} must be set")))?;
    let signer = Arc::new(TokenSigner::new(&SecretString::from(secret))?);

    let audit_dir =
        std::env::var(AUDIT_DIR_ENV).unwrap_or_else(|_| config.audit.directory.clone());
    let audit = AuditLogger::new(&audit_dir)?;

    let db = Database::open(&config.storage.database_path).await?;

    // Container runtime for ephemeral executors.
    let runtime = Arc::new(DockerCli::new());
    if let Err(e) = runtime.ping().await {
        return Err(WardenError::Config(format!(
            "container runtime unreachable: {e}"
        )));
    }
    let dispatcher = Arc::new(Dispatcher::new(
        runtime,
        signer,
        config.executors.clone(),
        &config.mounts,
    ));

    // MCP fleet and its egress proxy.
    let proxy = Arc::new(DomainProxy::bind(audit.clone()).await?);
    let proxy_addr = proxy.local_addr()?;
    info!(proxy = %proxy_addr, "mcp egress proxy listening");
    tokio::spawn(proxy.clone().run());

    // Egress rules for network-enabled executors: TCP/443 to resolved
    // allow-list addresses only, DNS pinned to the gateway proxy, private
    // ranges already dropped at resolution.
    if let Some(domains) = &config.executors.web.allowed_domains {
        if !domains.is_empty() {
            let resolved = warden_sandbox::resolve_allowed_domains(domains).await;
            let rules =
                warden_sandbox::iptables_rules(warden_sandbox::EGRESS_BRIDGE, &resolved, proxy_addr);
            for rule in &rules {
                info!(rule = %rule, "egress rule for web executor");
            }
        }
    }

    // Bridge transport (sink is needed by the gate before the loop starts).
    let server = Arc::new(BridgeServer::new(
        &config.bridge.socket_path,
        config.bridge.send_buffer,
    ));
    let sink = Arc::new(BroadcastSink::new(server.clone()));

    let gate = Arc::new(HitlGate::new(
        GatePolicy::new(
            config.action_tiers.clone(),
            config.trusted_domains.clone(),
            &config.mcp_servers,
        ),
        db.approvals(),
        audit.clone(),
        sink.clone(),
        &config.approval,
    ));

    let mcp = Arc::new(McpManager::new(Arc::new(DockerLauncher::new())));
    mcp.boot(&config.mcp_servers).await?;
    // TODO: resolve each MCP container's bridge IP via `docker inspect`
    // (needs --cidfile in the launcher) and call proxy.register with its
    // allowed_domains; until then operators register containers out of band.

    // Prompt assembly.
    let soul = SoulLoader::new(config.soul.file.as_deref(), audit.clone()).await;
    let skills = SkillCatalog::scan(&config.skills, audit.clone()).await?;
    let prompt = Arc::new(PromptBuilder::new(soul, skills, db.memories()));

    let provider = build_provider(&config)?;
    let orchestrator = Arc::new(Orchestrator::new(
        provider,
        gate.clone(),
        dispatcher,
        mcp.clone(),
        db.memories(),
        db.soul_versions(),
        prompt,
        audit.clone(),
        config.llm.model.clone(),
        config.llm.max_tokens,
    ));

    let tasks = Arc::new(TaskRunner::new(
        orchestrator.clone(),
        sink.clone(),
        config.task.max_iterations,
    ));
    let heartbeats = Arc::new(HeartbeatRunner::new(
        &config.heartbeats,
        orchestrator.clone(),
        sink.clone(),
    ));

    // Session table with grant cleanup on expiry.
    let sessions = SessionStore::new();
    {
        let gate = gate.clone();
        sessions.set_on_expired(move |session| {
            gate.grants().clear_session(&session.id);
        });
    }

    let cancel = install_signal_handler();
    sessions.spawn_sweeper(cancel.clone());
    gate.spawn_sweeper(cancel.clone());
    heartbeats.spawn(cancel.clone());

    let events = server.start().await?;
    let gateway = Arc::new(Gateway::new(
        sessions,
        db.memories(),
        gate,
        orchestrator,
        tasks,
        heartbeats,
        server.clone(),
        audit,
    ));

    info!("warden gateway ready");
    gateway.run(events, cancel.clone()).await;

    // Shutdown: transport first, then plug-ins, then storage.
    server.stop().await;
    mcp.shutdown().await;
    db.close().await?;
    info!("warden gateway stopped");
    Ok(())
}

/// Select the LLM provider implementation from config.
fn build_provider(config: &WardenConfig) -> Result<Arc<dyn LlmProvider>, WardenError> {
    match config.llm.provider.as_str() {
        "anthropic" => {
            let api_key = std::env::var(LLM_API_KEY_ENV)
                .map_err(|_| WardenError::Config(format!("{LLM_API_KEY_ENV} must be set")))?;
            Ok(Arc::new(warden_anthropic::AnthropicProvider::new(
                &api_key,
            )?))
        }
        other => Err(WardenError::Config(format!(
            "llm.provider `{other}` is not compiled into this build"
        ))),
    }
}

/// Install SIGINT/SIGTERM handlers, returning the shutdown token.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT, initiating shutdown"),
                _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
    });

    token
}

/// Initialize the tracing subscriber from the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warden={log_level},info")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
