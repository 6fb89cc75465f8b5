mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::{SlowStore, new_tx, service_over, test_service, test_store};
use spendguard::LedgerConfig;
use spendguard::application::{AppError, ErrorKind, Scope};
use spendguard::domain::{ImportItem, NewTransaction, validate_batch};
use spendguard::io::read_transactions_csv;

fn described(amount_cents: i64, category: &str, description: &str) -> NewTransaction {
    let mut tx = new_tx(amount_cents, category, "2025-01-15");
    tx.description = description.to_string();
    tx
}

#[tokio::test]
async fn test_import_unconstrained_batch() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let items = ImportItem::batch((0..5).map(|i| described(100 + i, "misc", &format!("item-{i}"))));
    let summary = service.bulk_import(&Scope::new(), items, 2).await?;

    assert_eq!(summary.accepted, 5);
    assert_eq!(summary.rejected, 0);
    assert!(summary.errors.is_empty());

    // Every index landed exactly once
    let mut seen: HashMap<String, usize> = HashMap::new();
    for tx in service.list_transactions().await? {
        *seen.entry(tx.description).or_default() += 1;
    }
    assert_eq!(seen.len(), 5);
    for i in 0..5 {
        assert_eq!(seen.get(&format!("item-{i}")), Some(&1));
    }
    Ok(())
}

#[tokio::test]
async fn test_import_mixed_batch_accounts_for_every_item() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.set_budget("food", 1000, None).await?;

    let items = vec![
        ImportItem::parsed(0, new_tx(300, "misc", "2025-01-01")),
        ImportItem::parsed(1, new_tx(0, "misc", "2025-01-02")),
        ImportItem::unparsable(2, "invalid amount: abc"),
        ImportItem::parsed(3, new_tx(100, "  ", "2025-01-03")),
        ImportItem::parsed(4, new_tx(1500, "food", "2025-01-04")),
        ImportItem::parsed(5, new_tx(250, "Transport", "2025-01-05")),
        ImportItem::parsed(6, new_tx(-20, "misc", "2025-01-06")),
    ];
    let total = items.len() as u64;

    let summary = service.bulk_import(&Scope::new(), items, 3).await?;
    assert_eq!(summary.accepted + summary.rejected, total);
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.rejected, 5);

    let errors = summary.errors_by_index();
    let indices: Vec<usize> = errors.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 6]);
    assert!(errors[0].error.contains("amount must be > 0"));
    assert_eq!(errors[1].error, "invalid amount: abc");
    assert!(errors[2].error.contains("transaction category is empty"));
    assert!(errors[3].error.contains("Budget exceeded"));
    assert!(errors[4].error.contains("amount must be > 0"));

    let stored = service.list_transactions().await?;
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().any(|t| t.category == "transport"));
    Ok(())
}

#[tokio::test]
async fn test_import_applies_budget_in_dispatch_order() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.set_budget("food", 1000, None).await?;

    let items = ImportItem::batch(vec![
        new_tx(600, "food", "2025-01-01"),
        new_tx(600, "food", "2025-01-02"),
        new_tx(300, "food", "2025-01-03"),
    ]);
    let summary = service.bulk_import(&Scope::new(), items, 1).await?;

    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.errors[0].index, 1);
    Ok(())
}

#[tokio::test]
async fn test_import_empty_batch() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let summary = service.bulk_import(&Scope::new(), Vec::new(), 4).await?;
    assert_eq!(summary.processed(), 0);
    Ok(())
}

#[tokio::test]
async fn test_import_out_of_range_worker_counts() -> Result<()> {
    let (service, _temp) = test_service().await?;

    for workers in [-1, 0, 1, 1000] {
        let items = ImportItem::batch((0..10).map(|_| new_tx(10, "misc", "2025-01-01")));
        let summary = service.bulk_import(&Scope::new(), items, workers).await?;
        assert_eq!(summary.accepted, 10, "workers = {workers}");
    }
    assert_eq!(service.list_transactions().await?.len(), 40);
    Ok(())
}

#[tokio::test]
async fn test_batch_validation_is_repeatable() -> Result<()> {
    let csv = "amount,category,description,date\n\
               12.50,food,lunch,2025-01-01\n\
               abc,food,bad amount,2025-01-02\n\
               0,food,zero,2025-01-03\n\
               5.00,,no category,2025-01-04\n\
               7.00,misc,bad date,yesterday\n";
    let items = read_transactions_csv(csv.as_bytes())?;
    assert_eq!(items.len(), 5);

    let first = validate_batch(&items);
    let second = validate_batch(&items);
    assert_eq!(first, second);

    let indices: Vec<usize> = first.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_import_reports_partial_summary() -> Result<()> {
    let (store, _temp) = test_store().await?;
    let slow = Arc::new(SlowStore::new(store.clone(), Duration::from_millis(20)));
    let service = service_over(slow.clone(), &store, LedgerConfig::default());

    let total = 50;
    let items = ImportItem::batch((0..total).map(|_| new_tx(10, "misc", "2025-01-01")));

    let scope = Scope::new();
    let canceller = scope.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        canceller.cancel();
    });

    let err = service.bulk_import(&scope, items, 2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let partial = err.partial_import().expect("partial summary");
    assert!(partial.processed() < total as u64);
    // Items already picked up finished and were counted
    assert_eq!(partial.accepted as usize, slow.inserts());
    assert!(matches!(err, AppError::ImportAborted { total: 50, .. }));
    Ok(())
}

#[tokio::test]
async fn test_import_deadline() -> Result<()> {
    let (store, _temp) = test_store().await?;
    let slow = Arc::new(SlowStore::new(store.clone(), Duration::from_millis(20)));
    let config = LedgerConfig {
        import_timeout: Some(Duration::from_millis(60)),
        ..LedgerConfig::default()
    };
    let service = service_over(slow, &store, config);

    let items = ImportItem::batch((0..50).map(|_| new_tx(10, "misc", "2025-01-01")));
    let err = service.bulk_import(&Scope::new(), items, 2).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    assert!(err.partial_import().expect("partial summary").processed() < 50);
    Ok(())
}

#[tokio::test]
async fn test_import_into_cancelled_scope_processes_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let scope = Scope::new();
    scope.cancel();

    let items = ImportItem::batch((0..3).map(|_| new_tx(10, "misc", "2025-01-01")));
    let err = service.bulk_import(&scope, items, 2).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.partial_import().map(|p| p.processed()), Some(0));
    assert!(service.list_transactions().await?.is_empty());
    Ok(())
}
