/// delinquency scan - missed installments escalate a borrower on a timer
use billing_engine::delinquency::DelinquencyScheduler;
use billing_engine::{
    BillingEngine, CallContext, CreateTransactionRequest, EngineConfig, Money, NewBorrower,
    NewLoanProduct, SafeTimeProvider, SqliteStore, TimeSource, DELINQUENCY_LIMIT_SETTING,
    EOD_DATE_SETTING,
};
use rust_decimal_macros::dec;
use simple_logger::SimpleLogger;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new().with_level(log::LevelFilter::Debug).init()?;

    let config = EngineConfig::from_json(r#"{ "scan_interval_secs": 1 }"#)?;
    let store = match &config.database_path {
        Some(path) => SqliteStore::open(path)?,
        None => SqliteStore::in_memory()?,
    };
    let engine = Arc::new(BillingEngine::new(store, config)?);

    let time = SafeTimeProvider::new(TimeSource::System);
    let ctx = CallContext::new("admin", &time);

    engine.put_setting(&ctx, EOD_DATE_SETTING, "2024-01-01")?;
    engine.put_setting(&ctx, DELINQUENCY_LIMIT_SETTING, "2")?;
    let borrower = engine.register_borrower(&ctx, NewBorrower::new("Budi", "budi@example.com", "hash"))?;
    let product = engine.create_loan_product(&ctx, NewLoanProduct::weekly("Mingguan", dec!(10), 4))?;
    engine.create_transaction(
        &ctx,
        CreateTransactionRequest::new(borrower.id, product.id, Money::from_major(1_000_000)),
    )?;

    // nothing paid for two weeks
    engine.put_setting(&ctx, EOD_DATE_SETTING, "2024-01-15")?;

    let scheduler = DelinquencyScheduler::from_config(Arc::clone(&engine));
    std::thread::sleep(Duration::from_millis(1500));

    // an on-demand run finds nothing left to count
    if let Some(report) = scheduler.run_now(&ctx)? {
        println!("manual run checked {} installments", report.checked);
    }
    scheduler.stop();

    let borrower = engine.get_borrower(&ctx, borrower.id)?;
    println!("delinquency level: {}", borrower.delinquency_level);

    let refused = engine.create_transaction(
        &ctx,
        CreateTransactionRequest::new(borrower.id, product.id, Money::from_major(500_000)),
    );
    if let Err(e) = refused {
        println!("new loan refused: {}", e);
    }

    Ok(())
}
