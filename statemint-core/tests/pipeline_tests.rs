//! End-to-end tests for the statement pipeline and categorization
//!
//! Real DuckDB files in a temp directory; the language model is a scripted
//! stand-in that answers layout prompts with a fixed mapping and batch
//! categorization prompts with an empty assignment list.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tempfile::TempDir;

use statemint_core::config::Config;
use statemint_core::domain::{CategorizationStatus, ColumnMapping, FileType};
use statemint_core::ports::{CategoryRepository, LlmClient, SourceRepository, TransactionRepository};
use statemint_core::services::{EntryPoint, LoggingService};
use statemint_core::{Error, Result, StatemintContext};

const SIMPLE_MAPPING: &str = r#"{"column_mapping": {"date": "Date", "description": "Description", "amount": "Amount", "currency": "", "balance": "Balance"}, "header_row": 0, "start_row": 1}"#;

const SIMPLE_CSV: &str = "Date,Description,Amount,Balance
2023-01-01,Salary ACME LTD,\"1,000.00\",1000.00
2023-01-02,TESCO SUPERMARKET 123,-50.00,950.00
2023-01-03,UBER TRIP,-100.00,850.00
";

struct ScriptedLlm {
    mapping: String,
    mapping_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(mapping: &str) -> Arc<Self> {
        Arc::new(Self {
            mapping: mapping.to_string(),
            mapping_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn mapping_calls(&self) -> usize {
        self.mapping_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.contains("Assign each bank transaction") {
            return Ok("[]".to_string());
        }
        self.mapping_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.mapping.clone())
    }
}

fn context(dir: &TempDir, llm: Arc<ScriptedLlm>) -> StatemintContext {
    let mut config = Config::default();
    config.categorization.strategies = vec!["existing".into(), "rules".into(), "keyword".into(), "llm".into()];
    StatemintContext::with_components(dir.path(), config, llm, None, None).unwrap()
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[tokio::test]
async fn test_schema_cache_skips_second_inference() {
    let dir = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(SIMPLE_MAPPING);
    let ctx = context(&dir, llm.clone());

    let first = ctx.upload_service.analyze("jan.csv", SIMPLE_CSV.as_bytes()).await.unwrap();
    assert!(!first.cache_hit);
    assert_eq!(llm.mapping_calls(), 1);

    // Same columns in a different order and file name: same shape
    let reordered = "Balance,Amount,Description,Date\n900.00,-10.00,Coffee,2023-02-01\n";
    let second = ctx.upload_service.analyze("feb.CSV", reordered.as_bytes()).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.statement_schema.id, first.statement_schema.id);
    assert_eq!(llm.mapping_calls(), 1);
    assert_eq!(second.preview[0].amount, dec("-10.00"));
}

#[tokio::test]
async fn test_analyze_statistics_and_dropped_rows() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, ScriptedLlm::new(SIMPLE_MAPPING));
    let csv = format!("{}not-a-date,Broken,-1.00,\n2023-01-04,   ,-2.00,\n", SIMPLE_CSV);

    let analysis = ctx.upload_service.analyze("jan.csv", csv.as_bytes()).await.unwrap();
    assert_eq!(analysis.rows_dropped, 2);
    assert_eq!(analysis.statistics.count, 3);
    assert_eq!(analysis.statistics.total_amount, dec("850.00"));
    assert_eq!(analysis.statistics.date_range_start, NaiveDate::from_ymd_opt(2023, 1, 1));
    assert_eq!(analysis.statistics.date_range_end, NaiveDate::from_ymd_opt(2023, 1, 3));
    assert_eq!(analysis.preview[0].balance, Some(dec("1000")));
}

#[tokio::test]
async fn test_import_skips_duplicates_on_reimport() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, ScriptedLlm::new(SIMPLE_MAPPING));
    let source = ctx.status_service.add_source("Current account").await.unwrap();

    let first = ctx
        .upload_service
        .import_file("jan.csv", SIMPLE_CSV.as_bytes(), source.id)
        .await
        .unwrap();
    assert_eq!(first.finalize.transactions_processed, 3);
    assert_eq!(first.finalize.skipped_duplicates, 0);
    assert!(first
        .finalize
        .transactions
        .iter()
        .all(|t| t.categorization_status == CategorizationStatus::Pending));

    // Overlapping statement: two known rows, one new
    let overlap = "Date,Description,Amount,Balance
2023-01-03,UBER TRIP,-100.00,850.00
2023-01-02,TESCO SUPERMARKET 123,-50,950.00
2023-01-05,Gym,-30.00,820.00
";
    let second = ctx
        .upload_service
        .import_file("jan-feb.csv", overlap.as_bytes(), source.id)
        .await
        .unwrap();
    assert_eq!(second.finalize.transactions_processed, 1);
    assert_eq!(second.finalize.skipped_duplicates, 2);
    assert_eq!(second.finalize.transactions[0].description, "Gym");

    let stored = ctx.repository.get_transactions(Some(source.id)).await.unwrap();
    assert_eq!(stored.len(), 4);

    // The same rows under another source are not duplicates
    let other = ctx.status_service.add_source("Savings").await.unwrap();
    let third = ctx
        .upload_service
        .import_file("jan.csv", SIMPLE_CSV.as_bytes(), other.id)
        .await
        .unwrap();
    assert_eq!(third.finalize.transactions_processed, 3);
}

#[tokio::test]
async fn test_import_excel_workbook() {
    let dir = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(SIMPLE_MAPPING);
    let ctx = context(&dir, llm.clone());
    let source = ctx.status_service.add_source("Current account").await.unwrap();
    let workbook = std::fs::read(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/statement.xlsx")).unwrap();

    let imported = ctx
        .upload_service
        .import_file("statement.xlsx", &workbook, source.id)
        .await
        .unwrap();
    assert_eq!(imported.analysis.file_type, FileType::Excel);
    assert_eq!(imported.analysis.rows_dropped, 0);
    assert_eq!(imported.analysis.statistics.count, 3);
    assert_eq!(imported.analysis.statistics.total_amount, dec("849.65"));
    assert_eq!(imported.analysis.statistics.date_range_start, NaiveDate::from_ymd_opt(2023, 1, 1));
    assert_eq!(imported.analysis.statistics.date_range_end, NaiveDate::from_ymd_opt(2023, 1, 3));
    assert_eq!(imported.finalize.transactions_processed, 3);

    let stored = ctx.repository.get_transactions(Some(source.id)).await.unwrap();
    let rows: Vec<_> = stored
        .iter()
        .map(|t| (t.date, t.description.as_str(), t.amount, t.balance))
        .collect();
    let day = |d: u32| NaiveDate::from_ymd_opt(2023, 1, d).unwrap();
    assert_eq!(
        rows,
        vec![
            (day(1), "Salary ACME LTD", dec("1000"), Some(dec("1000"))),
            (day(2), "TESCO SUPERMARKET 123", dec("-50.25"), Some(dec("949.75"))),
            (day(3), "UBER TRIP", dec("-100.1"), Some(dec("849.65"))),
        ]
    );

    // The CSV export of the same account overlaps on the salary row only;
    // a different file type is a different layout, so it is inferred again
    let csv = ctx
        .upload_service
        .import_file("jan.csv", SIMPLE_CSV.as_bytes(), source.id)
        .await
        .unwrap();
    assert_eq!(csv.finalize.skipped_duplicates, 1);
    assert_eq!(csv.finalize.transactions_processed, 2);
    assert_eq!(llm.mapping_calls(), 2);
}

#[tokio::test]
async fn test_debit_credit_statement_with_metadata_lines() {
    let mapping = r#"Sure! ```json
{"column_mapping": {"date": "Date", "description": "Details", "amount": "", "debit_amount": "Paid out", "credit_amount": "Paid in", "currency": null, "balance": ""}, "header_row": 2, "start_row": 3}
```"#;
    let csv = "Account Statement,,,
Sort code 12-34-56,,,
Date,Details,Paid out,Paid in
01/02/2023,Rent,500.00,
03/02/2023,Salary,,\"1,000.00\"
,,,
";
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, ScriptedLlm::new(mapping));
    let source = ctx.status_service.add_source("Bank").await.unwrap();

    let result = ctx
        .upload_service
        .import_file("statement.csv", csv.as_bytes(), source.id)
        .await
        .unwrap();
    let txs = &result.finalize.transactions;
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0].date, NaiveDate::from_ymd_opt(2023, 2, 1).unwrap());
    assert_eq!(txs[0].amount, dec("-500.00"));
    assert_eq!(txs[1].date, NaiveDate::from_ymd_opt(2023, 2, 3).unwrap());
    assert_eq!(txs[1].amount, dec("1000.00"));
    assert_eq!(txs[1].currency, "");
}

#[tokio::test]
async fn test_finalize_with_corrected_schema_updates_cache() {
    let dir = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(SIMPLE_MAPPING);
    let ctx = context(&dir, llm.clone());
    let source = ctx.status_service.add_source("Card").await.unwrap();

    let analysis = ctx.upload_service.analyze("jan.csv", SIMPLE_CSV.as_bytes()).await.unwrap();
    assert!(analysis.statement_schema.source_id.is_none());

    // The user drops the balance column and skips the salary row
    let mut request = analysis.accept(source.id);
    request.statement_schema.column_mapping = ColumnMapping {
        balance: String::new(),
        ..analysis.statement_schema.column_mapping.clone()
    };
    request.statement_schema.start_row = 2;
    let response = ctx.upload_service.finalize(&request).await.unwrap();
    assert_eq!(response.transactions_processed, 2);
    assert!(response.transactions.iter().all(|t| t.balance.is_none()));

    // Stored upload is gone once finalized
    assert!(matches!(
        ctx.upload_service.finalize(&request).await,
        Err(Error::NotFound(_))
    ));

    let again = ctx.upload_service.analyze("jan.csv", SIMPLE_CSV.as_bytes()).await.unwrap();
    assert!(again.cache_hit);
    assert_eq!(again.statement_schema.id, analysis.statement_schema.id);
    assert_eq!(again.statement_schema.source_id, Some(source.id));
    assert_eq!(again.statement_schema.start_row, 2);
    assert_eq!(again.statistics.count, 2);
    assert_eq!(llm.mapping_calls(), 1);
}

#[tokio::test]
async fn test_inferred_request_reuses_analysis_schema() {
    let dir = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(SIMPLE_MAPPING);
    let ctx = context(&dir, llm.clone());
    let source = ctx.status_service.add_source("Current account").await.unwrap();

    let analysis = ctx.upload_service.analyze("jan.csv", SIMPLE_CSV.as_bytes()).await.unwrap();
    let request = ctx
        .upload_service
        .inferred_request(analysis.statement_id, source.id)
        .await
        .unwrap();
    assert_eq!(request, analysis.accept(source.id));
    assert_eq!(llm.mapping_calls(), 1);

    let response = ctx.upload_service.finalize(&request).await.unwrap();
    assert_eq!(response.transactions_processed, 3);
}

#[tokio::test]
async fn test_rejected_inputs() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, ScriptedLlm::new("I could not find any columns, sorry."));

    let pdf = ctx.upload_service.analyze("statement.pdf", b"%PDF-1.4").await;
    assert!(matches!(pdf, Err(Error::UnsupportedFileType(_))));

    let garbage = ctx.upload_service.analyze("jan.csv", SIMPLE_CSV.as_bytes()).await;
    assert!(matches!(garbage, Err(Error::InvalidLlmResponse(_))));

    // Nothing was cached for the failed inference
    drop(ctx);
    let ctx = context(&dir, ScriptedLlm::new(SIMPLE_MAPPING));
    let analysis = ctx.upload_service.analyze("jan.csv", SIMPLE_CSV.as_bytes()).await.unwrap();
    assert!(!analysis.cache_hit);

    let missing_source = ctx.upload_service.finalize(&analysis.accept(404)).await;
    assert!(matches!(missing_source, Err(Error::NotFound(_))));

    let mut bad_rows = analysis.accept(1);
    ctx.status_service.add_source("Bank").await.unwrap();
    bad_rows.statement_schema.start_row = 0;
    assert!(matches!(
        ctx.upload_service.finalize(&bad_rows).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_categorization_chain_end_to_end() {
    let dir = TempDir::new().unwrap();
    let llm = ScriptedLlm::new(SIMPLE_MAPPING);
    let ctx = context(&dir, llm.clone());
    let source = ctx.status_service.add_source("Current account").await.unwrap();

    let groceries = ctx.category_service.add_category("Groceries", None, None).await.unwrap();
    let supermarket = ctx
        .category_service
        .add_category("Supermarket", Some(groceries.id), None)
        .await
        .unwrap();
    let income = ctx.category_service.add_category("Income", None, None).await.unwrap();

    let imported = ctx
        .upload_service
        .import_file("jan.csv", SIMPLE_CSV.as_bytes(), source.id)
        .await
        .unwrap();

    let summary = ctx
        .categorization_service
        .categorize_pending_transactions(None)
        .await
        .unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.categorized, 1);
    assert_eq!(summary.failed, 2);

    // The rule strategy matched "supermarket"; the LLM link saw the rest
    let tesco = ctx
        .repository
        .get_transaction(imported.finalize.transactions[1].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tesco.category_id, Some(groceries.id));
    assert_eq!(tesco.sub_category_id, Some(supermarket.id));
    let prompts = llm.prompts.lock().unwrap().clone();
    let categorize_prompt = prompts
        .iter()
        .find(|p| p.contains("Assign each bank transaction"))
        .unwrap();
    assert!(categorize_prompt.contains("UBER TRIP"));
    assert!(!categorize_prompt.contains("TESCO"));

    // Teach the history, then a new salary row is matched by the exact-history link
    let salary_id = imported.finalize.transactions[0].id;
    ctx.categorization_service.set_category(salary_id, income.id).await.unwrap();
    let feb = "Date,Description,Amount,Balance\n2023-02-01,Salary  ACME LTD.,1000.00,1850.00\n";
    ctx.upload_service
        .import_file("feb.csv", feb.as_bytes(), source.id)
        .await
        .unwrap();

    let summary = ctx
        .categorization_service
        .categorize_pending_transactions(None)
        .await
        .unwrap();
    assert_eq!((summary.processed, summary.categorized), (1, 1));

    let counts = ctx.repository.count_by_status().await.unwrap();
    assert_eq!((counts.categorized, counts.failed), (3, 1));

    assert_eq!(ctx.categorization_service.retry_failed().await.unwrap(), 1);
    assert_eq!(ctx.repository.count_by_status().await.unwrap().pending, 1);

    let tree = ctx.repository.get_category_tree().await.unwrap();
    assert_eq!(tree.len(), 2);
}

#[tokio::test]
async fn test_event_log_records_pipeline_without_content() {
    let dir = TempDir::new().unwrap();
    let logger = Arc::new(LoggingService::new(dir.path(), EntryPoint::Library, "test").unwrap());
    let mut config = Config::default();
    config.categorization.strategies = vec!["rules".into()];
    let ctx = StatemintContext::with_components(
        dir.path(),
        config,
        ScriptedLlm::new(SIMPLE_MAPPING),
        None,
        Some(logger.clone()),
    )
    .unwrap();
    let source = ctx.repository.add_source("Bank").await.unwrap();

    let csv = format!("{}garbage,Broken,x,\n", SIMPLE_CSV);
    ctx.upload_service
        .import_file("jan.csv", csv.as_bytes(), source.id)
        .await
        .unwrap();

    let entries = logger.get_recent(50).unwrap();
    let events: Vec<&str> = entries.iter().map(|e| e.event.as_str()).collect();
    for expected in ["schema_cache_miss", "rows_dropped", "statement_analyzed", "statement_finalized"] {
        assert!(events.contains(&expected), "missing {} in {:?}", expected, events);
    }
    let dropped = entries.iter().find(|e| e.event == "rows_dropped").unwrap();
    assert_eq!(dropped.count, Some(1));
    assert!(entries
        .iter()
        .all(|e| e.error_message.is_none() && e.command.is_none()));
}
