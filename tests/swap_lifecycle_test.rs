//! 兑换生命周期集成测试
//!
//! 使用内存存储与 mock 服务商驱动 create_swap → reconcile_pending

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use ironvault::domain::{ChainKind, ChainOptions, SwapStatus, TransactionKind, TransactionStatus};
use ironvault::error::AppError;
use ironvault::repository::WalletStore;
use ironvault::service::reconciliation_worker::ReconciliationWorker;
use ironvault::service::{RateRequest, SwapOrchestrator};
use uuid::Uuid;

#[tokio::test]
async fn test_create_swap_records_pending_with_bridge_ids() {
    let store = connected_memory_store().await;
    let gateway = MockGateway::new();
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let wallet = create_wallet(&*store, ChainKind::Ethereum, ChainOptions::default()).await;

    let record = orchestrator
        .create_swap(swap_request(wallet.id))
        .await
        .unwrap();

    assert_eq!(record.kind, TransactionKind::Swap);
    assert_eq!(record.status, TransactionStatus::Pending);
    assert_eq!(record.external_hash.as_deref(), Some("order-1"));
    assert_eq!(record.from_address, wallet.public_address);
    assert_eq!(record.amount, "250.000001");
    assert_eq!(record.currency_symbol, "USDT");
    assert_eq!(record.source_evm_chain_id, Some(1));
    assert_eq!(record.destination_evm_chain_id, Some(137));
    // 服务费 0.5 + 网络费 1.25
    assert_eq!(record.fee, "1.75");

    let stored = store
        .get_transaction_by_external_hash("order-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, record.id);

    let sent = gateway.order_requests.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].refund_address, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
}

#[tokio::test]
async fn test_create_swap_unknown_wallet() {
    let store = connected_memory_store().await;
    let gateway = MockGateway::new();
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let missing = Uuid::new_v4();

    let result = orchestrator.create_swap(swap_request(missing)).await;
    assert!(matches!(result, Err(AppError::WalletNotFound(id)) if id == missing));
    // 钱包不存在时不会下单
    assert!(gateway.order_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_swap_rejects_bad_amount_before_ordering() {
    let store = connected_memory_store().await;
    let gateway = MockGateway::new();
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let wallet = create_wallet(&*store, ChainKind::Ethereum, ChainOptions::default()).await;

    let mut request = swap_request(wallet.id);
    request.amount = "-5".into();
    assert!(matches!(
        orchestrator.create_swap(request).await,
        Err(AppError::InvalidParameter(_))
    ));
    assert!(gateway.order_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_quote_failure_records_zero_fee() {
    let store = connected_memory_store().await;
    let gateway = MockGateway::new();
    gateway.fail_quotes.store(true, Ordering::SeqCst);
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let wallet = create_wallet(&*store, ChainKind::Ethereum, ChainOptions::default()).await;

    let record = orchestrator
        .create_swap(swap_request(wallet.id))
        .await
        .unwrap();
    assert_eq!(record.fee, "0");

    // 单独报价则直接返回错误
    let quote = orchestrator
        .quote(&RateRequest {
            from_currency: "btc".into(),
            to_currency: "eth".into(),
            amount: "0.1".into(),
            from_evm_chain_id: None,
            to_evm_chain_id: None,
        })
        .await;
    assert!(matches!(quote, Err(AppError::ExternalGatewayError(_))));
}

#[tokio::test]
async fn test_overflowing_fee_records_zero_fee() {
    let store = connected_memory_store().await;
    let gateway = MockGateway::new();
    *gateway.quote_fee.lock().unwrap() = Some("79228162514264337593543950335".into());
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let wallet = create_wallet(&*store, ChainKind::Ethereum, ChainOptions::default()).await;

    let record = orchestrator
        .create_swap(swap_request(wallet.id))
        .await
        .unwrap();
    assert_eq!(record.fee, "0");
    assert_eq!(record.external_hash.as_deref(), Some("order-1"));
}

#[tokio::test]
async fn test_order_failure_writes_nothing() {
    let store = connected_memory_store().await;
    let gateway = MockGateway::new();
    gateway.fail_orders.store(true, Ordering::SeqCst);
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let wallet = create_wallet(&*store, ChainKind::Ethereum, ChainOptions::default()).await;

    assert!(matches!(
        orchestrator.create_swap(swap_request(wallet.id)).await,
        Err(AppError::ExternalGatewayError(_))
    ));
    assert!(store
        .get_transactions_by_wallet(wallet.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_reconcile_finished_completes_exactly_once() {
    let store = connected_memory_store().await;
    let gateway = MockGateway::new();
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let wallet = create_wallet(&*store, ChainKind::Ethereum, ChainOptions::default()).await;

    let record = orchestrator
        .create_swap(swap_request(wallet.id))
        .await
        .unwrap();

    // 仍在处理中：不写入
    gateway.set_status("order-1", SwapStatus::Exchanging);
    assert_eq!(orchestrator.reconcile_pending().await.unwrap(), 0);

    gateway.set_status("order-1", SwapStatus::Finished);
    assert_eq!(orchestrator.reconcile_pending().await.unwrap(), 1);

    let stored = store.get_transaction_by_id(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);

    // 第二轮：终态记录不再被扫描，也不再查询服务商
    let calls_before = gateway.status_calls.load(Ordering::SeqCst);
    assert_eq!(orchestrator.reconcile_pending().await.unwrap(), 0);
    assert_eq!(gateway.status_calls.load(Ordering::SeqCst), calls_before);
}

#[tokio::test]
async fn test_reconcile_isolates_failures_and_maps_refunds() {
    let store = connected_memory_store().await;
    let gateway = MockGateway::new();
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let wallet = create_wallet(&*store, ChainKind::Ethereum, ChainOptions::default()).await;

    let first = orchestrator
        .create_swap(swap_request(wallet.id))
        .await
        .unwrap();
    let second = orchestrator
        .create_swap(swap_request(wallet.id))
        .await
        .unwrap();
    let third = orchestrator
        .create_swap(swap_request(wallet.id))
        .await
        .unwrap();

    gateway.fail_status_for("order-1");
    gateway.set_status("order-2", SwapStatus::Refunded);
    gateway.set_status("order-3", SwapStatus::Finished);

    assert_eq!(orchestrator.reconcile_pending().await.unwrap(), 2);

    let status_of = |id| {
        let store = store.clone();
        async move { store.get_transaction_by_id(id).await.unwrap().unwrap().status }
    };
    assert_eq!(status_of(first.id).await, TransactionStatus::Pending);
    assert_eq!(status_of(second.id).await, TransactionStatus::Failed);
    assert_eq!(status_of(third.id).await, TransactionStatus::Completed);
}

#[tokio::test]
async fn test_partial_failure_can_be_replayed_idempotently() {
    let store = FlakyStore::connected().await;
    let gateway = MockGateway::new();
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let wallet = create_wallet(&*store, ChainKind::Ethereum, ChainOptions::default()).await;

    store.fail_records.store(true, Ordering::SeqCst);
    let err = orchestrator
        .create_swap(swap_request(wallet.id))
        .await
        .unwrap_err();

    let (external_id, pending) = match err {
        AppError::PartialSwapCreationFailure {
            external_id,
            pending,
            ..
        } => (external_id, pending),
        other => panic!("expected PartialSwapCreationFailure, got {:?}", other),
    };
    assert_eq!(external_id, "order-1");
    assert_eq!(pending.external_hash.as_deref(), Some("order-1"));
    assert!(store
        .get_transaction_by_external_hash("order-1")
        .await
        .unwrap()
        .is_none());

    store.fail_records.store(false, Ordering::SeqCst);
    let replayed = orchestrator
        .replay_orphaned_swap((*pending).clone())
        .await
        .unwrap();
    assert_eq!(replayed.external_hash.as_deref(), Some("order-1"));
    assert_eq!(replayed.status, TransactionStatus::Pending);

    // 重放两次只产生一条记录
    let again = orchestrator.replay_orphaned_swap(*pending).await.unwrap();
    assert_eq!(again.id, replayed.id);
    assert_eq!(
        store.get_transactions_by_wallet(wallet.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_swap_status_lookup() {
    let store = connected_memory_store().await;
    let gateway = MockGateway::new();
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let wallet = create_wallet(&*store, ChainKind::Ethereum, ChainOptions::default()).await;
    let record = orchestrator
        .create_swap(swap_request(wallet.id))
        .await
        .unwrap();

    gateway.set_status("order-1", SwapStatus::Sending);
    let report = orchestrator.swap_status(record.id).await.unwrap();
    assert_eq!(report.fine_status, SwapStatus::Sending);
    assert_eq!(report.local_status, TransactionStatus::Pending);
    assert_eq!(report.payin_hash.as_deref(), Some("order-1-payin"));

    let missing = Uuid::new_v4();
    assert!(matches!(
        orchestrator.swap_status(missing).await,
        Err(AppError::TransactionNotFound(id)) if id == missing
    ));
}

#[tokio::test]
async fn test_gateway_calls_time_out() {
    let store = connected_memory_store().await;
    let gateway = MockGateway::new();
    let orchestrator = SwapOrchestrator::new(
        store.clone(),
        gateway.clone(),
        Duration::from_millis(50),
    );
    let wallet = create_wallet(&*store, ChainKind::Ethereum, ChainOptions::default()).await;
    let record = orchestrator
        .create_swap(swap_request(wallet.id))
        .await
        .unwrap();

    gateway.set_status_delay(Duration::from_millis(500));
    assert!(matches!(
        orchestrator.swap_status(record.id).await,
        Err(AppError::ExternalGatewayError(msg)) if msg.contains("timed out")
    ));
    // 超时只影响该记录，对账本身仍然成功返回
    assert_eq!(orchestrator.reconcile_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_overlapping_reconciliation_is_skipped() {
    let store = connected_memory_store().await;
    let gateway = MockGateway::new();
    let orchestrator = Arc::new(orchestrator(store.clone(), gateway.clone()));
    let wallet = create_wallet(&*store, ChainKind::Ethereum, ChainOptions::default()).await;
    orchestrator
        .create_swap(swap_request(wallet.id))
        .await
        .unwrap();

    gateway.set_status("order-1", SwapStatus::Finished);
    gateway.set_status_delay(Duration::from_millis(300));

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.reconcile_pending().await })
    };
    // 等第一轮进入服务商调用
    while gateway.status_calls.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(orchestrator.reconcile_pending().await.unwrap(), 0);
    assert_eq!(first.await.unwrap().unwrap(), 1);
}

#[tokio::test]
async fn test_worker_reconciles_until_shutdown() {
    let store = connected_memory_store().await;
    let gateway = MockGateway::new();
    let orchestrator = Arc::new(orchestrator(store.clone(), gateway.clone()));
    let wallet = create_wallet(&*store, ChainKind::Ethereum, ChainOptions::default()).await;
    let record = orchestrator
        .create_swap(swap_request(wallet.id))
        .await
        .unwrap();
    gateway.set_status("order-1", SwapStatus::Failed);

    assert!(matches!(
        ReconciliationWorker::new(orchestrator.clone(), Duration::ZERO),
        Err(AppError::Config(_))
    ));
    let handle = ReconciliationWorker::new(orchestrator.clone(), Duration::from_millis(20))
        .unwrap()
        .spawn();

    let mut status = TransactionStatus::Pending;
    for _ in 0..100 {
        status = store
            .get_transaction_by_id(record.id)
            .await
            .unwrap()
            .unwrap()
            .status;
        if status != TransactionStatus::Pending {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, TransactionStatus::Failed);

    handle.shutdown().await;
    // 停止后不再查询服务商
    let calls = gateway.status_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(gateway.status_calls.load(Ordering::SeqCst), calls);
}
