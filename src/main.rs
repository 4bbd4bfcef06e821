use chrono::Utc;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tuition_ledger::{
    config::{database, school},
    console::Console,
    core::{charge::reconcile_charges, report::ReportScope, settings::seed_settings},
    entities::Currency,
    errors::Result,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the school configuration
    let config = school::load_default_config()
        .inspect_err(|e| error!("Failed to load school configuration: {}", e))?;
    info!(school = %config.school.name, "Configuration loaded");

    // 4. Connect and make sure the schema exists
    let db = database::create_connection()
        .await
        .inspect(|_| info!("Database connected"))
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;

    // 5. Seed settings on first run; afterwards the stored row wins
    let settings = seed_settings(&db, &config)
        .await
        .inspect_err(|e| error!("Failed to seed school settings: {}", e))?;

    // 6. Bring charges up to date, the same way a page load does
    let console = Console::new(db);
    let today = Utc::now().date_naive();
    let refresh = console.refresh_page(today).await?;
    if let Some(generated) = &refresh.charges {
        info!(
            created = generated.created,
            enrollments = generated.enrollments_processed,
            "Monthly charges checked"
        );
    }
    info!(newly_overdue = refresh.newly_overdue, "Overdue charges marked");

    let reconciled = reconcile_charges(console.db(), console.feed(), today).await?;
    if reconciled.corrected > 0 {
        info!(corrected = reconciled.corrected, "Charges reconciled with the ledger");
    }

    // 7. Log the dashboard for the billed year
    let summary = console
        .dashboard(&ReportScope::year(settings.current_academic_year), today)
        .await?;
    info!(
        year = summary.academic_year,
        month = summary.period_month,
        students = summary.total_students,
        matriculados = summary.solvency.matriculados,
        solventes = summary.solvency.solventes,
        parciales = summary.solvency.parciales,
        pendientes = summary.solvency.pendientes,
        morosos = summary.solvency.morosos,
        "Dashboard"
    );
    for currency in [Currency::Nio, Currency::Usd] {
        info!(
            %currency,
            mensualidades = summary.revenue.mensualidades(currency),
            matriculas = summary.revenue.matriculas(currency),
            "Revenue"
        );
    }

    Ok(())
}
