/// quick start - issue a weekly loan, check what is due, pay it
use billing_engine::{
    BillingEngine, CallContext, CreateTransactionRequest, EngineConfig, MemoryStore, Money,
    NewBorrower, NewLoanProduct, PayRequest, SafeTimeProvider, TimeSource, EOD_DATE_SETTING,
    DELINQUENCY_LIMIT_SETTING,
};
use rust_decimal_macros::dec;
use simple_logger::SimpleLogger;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new().with_level(log::LevelFilter::Info).init()?;

    let engine = BillingEngine::new(MemoryStore::new(), EngineConfig::whole_units())?;
    let time = SafeTimeProvider::new(TimeSource::System);
    let ctx = CallContext::new("admin", &time);

    // business date and delinquency threshold live in settings
    engine.put_setting(&ctx, EOD_DATE_SETTING, "2024-01-01")?;
    engine.put_setting(&ctx, DELINQUENCY_LIMIT_SETTING, "2")?;

    let borrower = engine.register_borrower(&ctx, NewBorrower::new("Ayu", "ayu@example.com", "hash"))?;
    let product = engine.create_loan_product(&ctx, NewLoanProduct::weekly("Modal Usaha", dec!(10), 50))?;

    // 5,000,000 over 50 weeks at 10% per installment
    let created = engine.create_transaction(
        &ctx,
        CreateTransactionRequest::new(borrower.id, product.id, Money::from_major(5_000_000)),
    )?;
    println!(
        "issued {} with {} installments",
        created.transaction.invoice_number,
        created.installments.len()
    );

    // two weeks later
    engine.put_setting(&ctx, EOD_DATE_SETTING, "2024-01-15")?;
    let outstanding = engine.calculate_outstanding(&ctx, borrower.id)?;
    println!("due now: {}", outstanding.amount_payable());
    println!("total outstanding: {}", outstanding.total_outstanding);

    let receipt = engine.pay(
        &ctx,
        PayRequest::new(created.transaction.id, borrower.id, outstanding.amount_payable()),
    )?;
    println!("settled {} installments", receipt.settled_count());

    let after = engine.calculate_outstanding(&ctx, borrower.id)?;
    println!("{}", serde_json::to_string_pretty(&after)?);

    Ok(())
}
