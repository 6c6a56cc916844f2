/*
 * Licensed to the Apache Software Foundation (ASF) under one or more
 * contributor license agreements.  See the NOTICE file distributed with
 * this work for additional information regarding copyright ownership.
 * The ASF licenses this file to You under the Apache License, Version 2.0
 * (the "License"); you may not use this file except in compliance with
 * the License.  You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::{sync::Arc, time::Duration};

use srad::{
    register, Address, ConnectOptions, ConnectivityState, ConsumerOptions, Discovery,
    MemoryDirectory, RegisterOptions, Resolver, ServiceKey,
};
use tokio::sync::mpsc;

type Updates = mpsc::UnboundedReceiver<Vec<Address>>;

async fn resolve(directory: &MemoryDirectory, service: &str) -> (Resolver, Updates) {
    let (tx, rx) = mpsc::unbounded_channel();
    let resolver = Resolver::build(
        ServiceKey::new("mm", service),
        directory,
        &[],
        tx,
        &ConnectOptions::default(),
    )
    .await
    .unwrap();
    (resolver, rx)
}

fn addrs(addresses: &[Address]) -> Vec<&str> {
    let mut addrs: Vec<&str> = addresses.iter().map(|a| a.addr.as_str()).collect();
    addrs.sort();
    addrs
}

async fn next(updates: &mut Updates) -> Vec<Address> {
    tokio::time::timeout(Duration::from_secs(60), updates.recv())
        .await
        .expect("no update")
        .expect("resolver stopped")
}

#[tokio::test]
async fn test_snapshot_does_not_depend_on_store_order() {
    let entries = [
        ("mm:///auth/10.0.0.1:80?weight=2", "10.0.0.1:80"),
        ("mm:///auth/10.0.0.2:80", "10.0.0.2:80"),
        ("mm:///auth/10.0.0.3:80?weight=5", "10.0.0.3:80"),
    ];
    let forward = MemoryDirectory::new();
    let backward = MemoryDirectory::new();
    for (key, value) in entries.iter() {
        forward.put(key, value);
    }
    for (key, value) in entries.iter().rev() {
        backward.put(key, value);
    }
    forward.put("mm:///user/10.0.0.9:80", "10.0.0.9:80");

    let (_r1, mut first) = resolve(&forward, "auth").await;
    let (_r2, mut second) = resolve(&backward, "auth").await;
    let mut first = next(&mut first).await;
    let mut second = next(&mut second).await;
    first.sort_by(|a, b| a.addr.cmp(&b.addr));
    second.sort_by(|a, b| a.addr.cmp(&b.addr));

    assert_eq!(first, second);
    assert_eq!(addrs(&first), vec!["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]);
    assert_eq!(first[0].weight, "2");
    assert_eq!(first[1].weight, "");
}

#[tokio::test]
async fn test_malformed_weight_fails_build() {
    let directory = MemoryDirectory::new();
    directory.put("mm:///auth/10.0.0.1:80?weight=heavy", "10.0.0.1:80");

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = Resolver::build(
        ServiceKey::new("mm", "auth"),
        &directory,
        &[],
        tx,
        &ConnectOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, srad::Error::MalformedWeight { .. }));
}

#[tokio::test]
async fn test_duplicate_put_is_not_emitted() {
    let directory = MemoryDirectory::new();
    directory.put("mm:///auth/a:1", "a:1");
    let (_resolver, mut updates) = resolve(&directory, "auth").await;
    assert_eq!(addrs(&next(&mut updates).await), vec!["a:1"]);

    directory.put("mm:///auth/a:1", "a:1");
    directory.put("mm:///auth/b:1", "b:1");

    // the duplicate produced nothing, the next update already holds b
    assert_eq!(addrs(&next(&mut updates).await), vec!["a:1", "b:1"]);
    assert!(updates.try_recv().is_err());
}

#[tokio::test]
async fn test_delete_of_absent_address_is_not_emitted() {
    let directory = MemoryDirectory::new();
    // two keys for one address collapse into one entry
    directory.put("mm:///auth/a:1?weight=1", "a:1");
    directory.put("mm:///auth/a:1?weight=2", "a:1");
    let (_resolver, mut updates) = resolve(&directory, "auth").await;
    let initial = next(&mut updates).await;
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0].weight, "1");

    directory.delete("mm:///auth/a:1?weight=1");
    assert!(next(&mut updates).await.is_empty());

    directory.delete("mm:///auth/a:1?weight=2");
    directory.put("mm:///auth/c:1", "c:1");
    assert_eq!(addrs(&next(&mut updates).await), vec!["c:1"]);
}

#[tokio::test]
async fn test_updates_follow_change_order() {
    let directory = MemoryDirectory::new();
    let (_resolver, mut updates) = resolve(&directory, "auth").await;
    assert!(next(&mut updates).await.is_empty());

    directory.put("mm:///auth/a:1", "a:1");
    directory.put("mm:///auth/b:1", "b:1");
    directory.delete("mm:///auth/a:1");

    assert_eq!(addrs(&next(&mut updates).await), vec!["a:1"]);
    assert_eq!(addrs(&next(&mut updates).await), vec!["a:1", "b:1"]);
    assert_eq!(addrs(&next(&mut updates).await), vec!["b:1"]);
}

#[tokio::test]
async fn test_close_stops_updates() {
    let directory = MemoryDirectory::new();
    let (resolver, mut updates) = resolve(&directory, "auth").await;
    next(&mut updates).await;

    resolver.close();
    resolver.close();
    directory.put("mm:///auth/a:1", "a:1");
    assert!(updates.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_lease_expiry_removes_address() {
    let directory = MemoryDirectory::new();
    let options = RegisterOptions::new("mm", "auth", "10.0.0.1", 80).with_ttl(10);
    let registration = register(&directory, options, &[]).await.unwrap();

    let (_resolver, mut updates) = resolve(&directory, "auth").await;
    assert_eq!(addrs(&next(&mut updates).await), vec!["10.0.0.1:80"]);

    // stays alive while the keepalive runs
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(updates.try_recv().is_err());

    directory.sever_keep_alive(registration.lease_id());
    assert!(next(&mut updates).await.is_empty());
    assert!(directory.keys().is_empty());
}

#[tokio::test]
async fn test_unregister_removes_address() {
    let directory = MemoryDirectory::new();
    let options = RegisterOptions::new("mm", "auth", "10.0.0.1", 80).with_weight(4);
    let registration = register(&directory, options, &[]).await.unwrap();

    let (_resolver, mut updates) = resolve(&directory, "auth").await;
    let initial = next(&mut updates).await;
    assert_eq!(initial[0].weight, "4");

    registration.unregister().await.unwrap();
    assert!(next(&mut updates).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_discover_builds_one_pool() {
    let directory = MemoryDirectory::new();
    directory.put("mm:///auth/a:1", "a:1");
    let options = ConsumerOptions {
        pool_size: 1,
        ..Default::default()
    };
    let discovery = Arc::new(Discovery::new(Arc::new(directory.clone()), options).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let discovery = discovery.clone();
            tokio::spawn(async move { discovery.discover("mm", "auth", &[]).await })
        })
        .collect();
    let mut channels = Vec::new();
    for handle in handles {
        channels.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(discovery.len(), 1);
    assert_eq!(directory.connect_count(), 1);
    for channel in &channels {
        assert!(Arc::ptr_eq(channel, &channels[0]));
        assert_eq!(channel.pick().unwrap().addr, "a:1");
    }
}

#[tokio::test]
async fn test_dead_watch_rebuilds_channel() {
    let directory = MemoryDirectory::new();
    directory.put("mm:///auth/a:1", "a:1");
    let options = ConsumerOptions {
        pool_size: 1,
        ..Default::default()
    };
    let discovery = Discovery::new(Arc::new(directory.clone()), options).unwrap();

    let first = discovery.discover("mm", "auth", &[]).await.unwrap();
    assert_eq!(first.state(), ConnectivityState::Ready);

    directory.cancel_watches();
    for _ in 0..100 {
        if first.state() == ConnectivityState::TransientFailure {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(first.state(), ConnectivityState::TransientFailure);

    let second = discovery.discover("mm", "auth", &[]).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.state(), ConnectivityState::Shutdown);
    assert_eq!(second.state(), ConnectivityState::Ready);
    assert_eq!(directory.connect_count(), 2);
}

#[tokio::test]
async fn test_discover_picks_by_weight() {
    let directory = MemoryDirectory::new();
    register(
        &directory,
        RegisterOptions::new("mm", "auth", "10.0.0.1", 80).with_weight(1),
        &[],
    )
    .await
    .unwrap();
    register(
        &directory,
        RegisterOptions::new("mm", "auth", "10.0.0.2", 80).with_weight(3),
        &[],
    )
    .await
    .unwrap();

    let discovery = Discovery::new(Arc::new(directory.clone()), ConsumerOptions::default()).unwrap();
    let channel = discovery.discover("mm", "auth", &[]).await.unwrap();
    let picks: Vec<_> = (0..4).map(|_| channel.pick().unwrap().addr).collect();
    assert_eq!(picks, vec!["10.0.0.2:80", "10.0.0.2:80", "10.0.0.1:80", "10.0.0.2:80"]);
}
