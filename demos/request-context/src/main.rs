/*!
# Request Context Demo

Shows request-scoped state flowing through a middleware chain without being
passed as an argument.

## Key Concepts
1.  **Named contexts**: `request` and `session` are separate scopes.
2.  **Fresh scope per call**: each simulated request opens its own scopes, so
    concurrent requests never see each other's values.
3.  **Short-circuit**: `require_session` stops the chain for anonymous callers.
4.  **Spawned work**: `propagate` carries the scopes into a `tokio::spawn`.

## Flow
`request` provider -> timing -> `session` provider -> require session -> handler
*/

use futures_util::future::join_all;
use std::time::{Duration, Instant};
use tether::observe::init_stdout_tracing;
use tether::prelude::*;

// ============================================================================
// 1. Context Schemas
// ============================================================================

enum RequestContext {}
impl ContextSchema for RequestContext {}
impl DeclaredContext for RequestContext {
    const NAME: &'static str = "request";
}

const REQUEST_ID: Key<String, RequestContext> = Key::new("request_id");
const PATH: Key<String, RequestContext> = Key::new("path");

// `session` is never declared; its keys use the dynamic schema.
const USER: Key<String> = Key::new("user");

#[derive(Debug, thiserror::Error)]
#[error("anonymous request to {path}")]
struct Unauthorized {
    path: String,
}

// ============================================================================
// 2. Providers
// ============================================================================

fn timing() -> Provider<String> {
    from_fn(|next: Next<String>| async move {
        let started = Instant::now();
        let result = next.run().await;
        tracing::info!(elapsed = ?started.elapsed(), ok = result.is_ok(), "request finished");
        result
    })
}

fn require_session(factory: &ContextFactory) -> Provider<String> {
    let factory = factory.clone();
    from_fn(move |next: Next<String>| {
        let factory = factory.clone();
        async move {
            let user = factory.load("session").and_then(|ctx| ctx.get(&USER));
            match user {
                Some(_) => next.run().await,
                None => {
                    let path = factory
                        .load_typed::<RequestContext>()
                        .and_then(|ctx| ctx.get(&PATH))
                        .unwrap_or_default();
                    Err(Unauthorized { path }.into())
                }
            }
        }
    })
}

// ============================================================================
// 3. Terminal Handler
// ============================================================================

async fn profile(factory: ContextFactory) -> ChainResult<String> {
    let request = factory
        .load_typed::<RequestContext>()
        .ok_or_else(|| anyhow::anyhow!("request context missing"))?;
    let session = factory
        .load("session")
        .ok_or_else(|| anyhow::anyhow!("session context missing"))?;

    // Simulate a slow downstream call; the scopes survive the await.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let audit_factory = factory.clone();
    let audit = tokio::spawn(propagate(async move {
        audit_factory
            .load_typed::<RequestContext>()
            .and_then(|ctx| ctx.get(&REQUEST_ID))
    }));

    let request_id = request.get(&REQUEST_ID).unwrap_or_default();
    let audited = audit.await?.unwrap_or_default();
    let user = session.get(&USER).unwrap_or_default();

    Ok(format!("{user} served by {request_id} (audit saw {audited})"))
}

// ============================================================================
// 4. Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_stdout_tracing();

    let factory = ContextFactory::from_config(FactoryConfig::from_env()?);
    factory.create_typed::<RequestContext>();
    factory.create("session");

    let calls = [
        ("/profile", Some("alice")),
        ("/profile", None),
        ("/profile", Some("bob")),
    ];

    let runs = calls.into_iter().map(|(path, user)| {
        let factory = factory.clone();
        async move {
            let request = factory.provider_typed::<RequestContext, String, _, _>(
                move |ctx, next| async move {
                    ctx.set(&REQUEST_ID, uuid::Uuid::new_v4().to_string())?;
                    ctx.set(&PATH, path.to_string())?;
                    next.run().await
                },
            );
            let session = factory.provider_with("session", move |ctx: ContextContainer, next: Next<String>| async move {
                if let Some(user) = user {
                    ctx.set(&USER, user.to_string())?;
                }
                next.run().await
            });

            let handler = with_context(vec![
                request,
                timing(),
                session,
                require_session(&factory),
            ]);

            let terminal_factory = factory.clone();
            handler.run(move || profile(terminal_factory)).await
        }
    });

    for result in join_all(runs).await {
        match result {
            Ok(body) => tracing::info!(%body, "200"),
            Err(e) => match e.downcast_ref::<Unauthorized>() {
                Some(denied) => tracing::warn!(%denied, "401"),
                None => return Err(e),
            },
        }
    }

    Ok(())
}
