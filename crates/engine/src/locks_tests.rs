// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn same_key_is_exclusive() {
    let locks = KeyedLocks::new();
    let guard = locks.exclusive(&"a").await;
    assert!(locks
        .exclusive_timeout(&"a", Duration::from_millis(20))
        .await
        .is_none());
    drop(guard);
    assert!(locks
        .exclusive_timeout(&"a", Duration::from_millis(20))
        .await
        .is_some());
}

#[tokio::test]
async fn different_keys_do_not_contend() {
    let locks = KeyedLocks::new();
    let _a = locks.exclusive(&"a").await;
    assert!(locks
        .exclusive_timeout(&"b", Duration::from_millis(20))
        .await
        .is_some());
}

#[tokio::test]
async fn shared_holders_coexist_but_block_exclusive() {
    let locks = KeyedLocks::new();
    let _r1 = locks.shared(&1).await;
    let _r2 = locks.shared(&1).await;
    assert!(locks
        .exclusive_timeout(&1, Duration::from_millis(20))
        .await
        .is_none());
}

#[tokio::test]
async fn released_locks_are_reclaimed() {
    let locks = KeyedLocks::new();
    {
        let _g = locks.exclusive(&"a").await;
        assert_eq!(locks.live(), 1);
    }
    assert_eq!(locks.live(), 0);
}

#[tokio::test]
async fn waiter_proceeds_after_release() {
    let locks = Arc::new(KeyedLocks::new());
    let guard = locks.exclusive(&"k").await;
    let waiter = {
        let locks = Arc::clone(&locks);
        tokio::spawn(async move {
            let _g = locks.exclusive(&"k").await;
            true
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished());
    drop(guard);
    assert!(waiter.await.unwrap());
}
