use anyhow::Context;
use dojo_auth::IdentityRecord;
use dojo_gateway::{GatewayConfig, RestBackend, SessionGateway};
use dojo_session::IdentityContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dojo_observability::init();

    let config = GatewayConfig::from_env();
    let backend = RestBackend::new(&config);
    let context = IdentityContext::new(SessionGateway::new(backend, config.provisioning));

    context.initialize().await;

    if !context.is_authenticated() {
        let (Ok(email), Ok(password)) = (std::env::var("DOJO_EMAIL"), std::env::var("DOJO_PASSWORD"))
        else {
            tracing::warn!("no session and DOJO_EMAIL/DOJO_PASSWORD not set; nothing to show");
            return Ok(());
        };
        context
            .login(&email, &password)
            .await
            .with_context(|| format!("login as {email} failed"))?;
    }

    if let Some(identity) = context.identity() {
        log_dashboard(&identity);
    }
    Ok(())
}

fn log_dashboard(identity: &IdentityRecord) {
    let roles: Vec<&str> = identity.roles.iter().map(|r| r.name()).collect();
    tracing::info!(
        name = %identity.name,
        initial = %identity.initial(),
        belt = identity.belt.label(),
        degree = identity.degree,
        next_degree = identity.next_degree(),
        member_for = %identity.elapsed_membership_duration(),
        next_session = %identity.next_session,
        roles = ?roles,
        access_level = identity.max_access_level(),
        "dashboard"
    );
}
