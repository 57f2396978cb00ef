// RepairHub Server - community repair sharing backend

use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use repairhub::{app_state::AppState, config::Config, http::create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize application state (store, hub, optional demo data)
    let app_state = AppState::new(config.clone()).await?;

    // Build application router
    let app = create_router(app_state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    // Start server
    let addr = config.server_address();
    println!("🔧 RepairHub server starting on http://{}", addr);
    println!("📋 API overview:");
    println!("  POST   /api/auth/register | login | logout   - Accounts");
    println!("  GET    /api/posts, /api/posts/trending       - Repair posts");
    println!("  GET    /api/posts/{{id}}/thread                - Comment tree");
    println!("  POST   /api/posts/{{id}}/vote | bookmark       - Toggles");
    println!("  GET    /api/guides, /api/categories          - Guides");
    println!("  GET    /api/notifications                    - Notifications");
    println!("  GET    /api/admin/stats, /api/reports        - Moderation");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
