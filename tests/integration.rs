//! Integration tests for the hosts container.
//!
//! These tests run the container over real hosts files in a temporary root.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::Query;
use hickory_proto::rr::rdata::{A, CNAME};
use hickory_proto::rr::{Name, RData, RecordType};
use hosts_container::container::{ContainerError, HostsContainer, RefreshOutcome};
use hosts_container::hosts::{DirFs, HostTable};
use hosts_container::rules::{DnsRequest, RewriteCompiler, RewriteEngine};
use hosts_container::updates::UpdateReceiver;
use hosts_container::watch::{ChannelWatcher, NotifyWatcher, WatchEvent};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Helper to create a root with an `etc/hosts` file.
fn create_root(content: &str) -> TempDir {
    let root = TempDir::new().unwrap();
    std::fs::create_dir(root.path().join("etc")).unwrap();
    std::fs::write(root.path().join("etc/hosts"), content).unwrap();
    root
}

async fn start(
    root: &Path,
    paths: &[&str],
) -> (HostsContainer<RewriteEngine>, mpsc::Sender<WatchEvent>) {
    let (watcher, events) = ChannelWatcher::new();
    let container = HostsContainer::new(7, DirFs::new(root), watcher, RewriteCompiler, paths)
        .await
        .unwrap();
    (container, events)
}

fn lookup(container: &HostsContainer<RewriteEngine>, host: &str, qtype: RecordType) -> Vec<IpAddr> {
    container
        .match_request(&DnsRequest::new(host, qtype))
        .map(|res| res.addresses().collect())
        .unwrap_or_default()
}

async fn next_table(rx: &UpdateReceiver) -> Arc<HostTable> {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("no hosts table received in time")
        .expect("updates channel closed")
}

#[tokio::test]
async fn should_answer_router_example() {
    let root = create_root("192.0.2.1 router router.lan # gateway\n");
    let (container, _events) = start(root.path(), &["/etc/hosts"]).await;
    let router = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

    assert_eq!(lookup(&container, "router", RecordType::A), vec![router]);
    assert_eq!(lookup(&container, "router.lan", RecordType::A), vec![router]);
    assert!(lookup(&container, "router", RecordType::AAAA).is_empty());

    let res = container
        .match_request(&DnsRequest::new("1.2.0.192.in-addr.arpa", RecordType::PTR))
        .unwrap();
    assert_eq!(res.ptr(), Some("router."));
    assert_eq!(res.rules[0].list_id, 7);

    container.close().await;
}

#[tokio::test]
async fn should_build_answers_from_dns_query() {
    let root = create_root("192.0.2.1 router router.lan\n");
    let (container, _events) = start(root.path(), &["etc/hosts"]).await;

    let qname = Name::from_str("router.lan.").unwrap();
    let query = Query::query(qname.clone(), RecordType::A);
    let res = container.match_request(&DnsRequest::from(&query)).unwrap();
    let answers = res.answers(&qname, 300);

    let router = Name::from_str("router.").unwrap();
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0].data(), &RData::CNAME(CNAME(router.clone())));
    assert_eq!(answers[1].name(), &router);
    assert_eq!(answers[1].data(), &RData::A(A(Ipv4Addr::new(192, 0, 2, 1))));

    container.close().await;
}

#[tokio::test]
async fn should_answer_shared_alias_for_each_address_family() {
    let root = create_root("10.0.0.1 host4 shared\n::1 host6 shared\n");
    let (container, _events) = start(root.path(), &["etc/hosts"]).await;

    let v6 = container
        .match_request(&DnsRequest::new("shared", RecordType::AAAA))
        .unwrap();
    assert_eq!(v6.cname(), Some("host6"));
    assert_eq!(v6.addresses().collect::<Vec<_>>(), vec![IpAddr::from(Ipv6Addr::LOCALHOST)]);

    let v4 = container
        .match_request(&DnsRequest::new("shared", RecordType::A))
        .unwrap();
    assert_eq!(v4.cname(), Some("host4"));
    assert_eq!(v4.addresses().collect::<Vec<_>>(), vec![IpAddr::from([10, 0, 0, 1])]);

    container.close().await;
}

#[tokio::test]
async fn should_not_answer_self_alias_for_case_variants() {
    let root = create_root("10.0.0.1 router Router\n");
    let (container, _events) = start(root.path(), &["etc/hosts"]).await;

    assert!(
        container
            .match_request(&DnsRequest::new("router", RecordType::AAAA))
            .is_none()
    );
    assert_eq!(
        lookup(&container, "ROUTER", RecordType::A),
        vec![IpAddr::from([10, 0, 0, 1])]
    );

    container.close().await;
}

#[tokio::test]
async fn should_translate_both_rules_to_hosts_line() {
    let root = create_root("2001:db8::1 v6host v6alias\n");
    let (container, _events) = start(root.path(), &["etc/hosts"]).await;

    let forward = container
        .match_request(&DnsRequest::new("v6host", RecordType::AAAA))
        .unwrap();
    let reverse = container
        .match_request(&DnsRequest::new(
            "1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.8.b.d.0.1.0.0.2.ip6.arpa",
            RecordType::PTR,
        ))
        .unwrap();

    let line = container.translate(&forward.rules[0].text).unwrap();
    assert_eq!(line, "2001:db8::1 v6host v6alias");
    assert_eq!(container.translate(&reverse.rules[0].text).unwrap(), line);

    container.close().await;
}

#[tokio::test]
async fn should_merge_directory_of_hosts_files() {
    let root = create_root("10.0.0.1 main\n");
    let hosts_d = root.path().join("etc/hosts.d");
    std::fs::create_dir(&hosts_d).unwrap();
    std::fs::write(hosts_d.join("20-late"), "10.0.0.1 late\n10.0.0.3 third\n").unwrap();
    std::fs::write(hosts_d.join("10-early"), "10.0.0.1 early\n::ffff:10.0.0.2 mapped\n").unwrap();

    let (container, _events) =
        start(root.path(), &["etc/hosts", "etc/missing", "etc/hosts.d"]).await;
    let table = container.updates().try_recv().unwrap();

    let record = table.get(&IpAddr::from([10, 0, 0, 1])).unwrap();
    assert_eq!(record.main, "main");
    assert_eq!(
        record.aliases.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["early", "late"]
    );
    assert_eq!(
        lookup(&container, "mapped", RecordType::A),
        vec![IpAddr::from([10, 0, 0, 2])]
    );
    assert_eq!(table.len(), 3);

    container.close().await;
}

#[tokio::test]
async fn should_fail_without_existing_paths() {
    let root = TempDir::new().unwrap();
    let (watcher, _events) = ChannelWatcher::new();

    let err = HostsContainer::new(1, DirFs::new(root.path()), watcher, RewriteCompiler, &[
        "etc/hosts",
    ])
    .await
    .unwrap_err();

    assert!(matches!(err, ContainerError::NoHostsPaths));
}

#[tokio::test]
async fn should_refresh_when_file_changes() {
    let root = create_root("10.0.0.1 before\n");
    let (container, events) = start(root.path(), &["etc/hosts"]).await;
    let rx = container.updates();
    next_table(&rx).await;

    std::fs::write(root.path().join("etc/hosts"), "10.0.0.9 after\n").unwrap();
    events
        .send(WatchEvent::new([root.path().join("etc/hosts")]))
        .await
        .unwrap();

    let table = next_table(&rx).await;
    assert_eq!(table.get(&IpAddr::from([10, 0, 0, 9])).unwrap().main, "after");
    assert!(lookup(&container, "before", RecordType::A).is_empty());
    assert_eq!(
        lookup(&container, "after", RecordType::A),
        vec![IpAddr::from([10, 0, 0, 9])]
    );

    container.close().await;
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn should_ignore_unchanged_content() {
    let root = create_root("10.0.0.1 host\n");
    let (container, _events) = start(root.path(), &["etc/hosts"]).await;
    container.updates().try_recv().unwrap();

    std::fs::write(root.path().join("etc/hosts"), "10.0.0.1 host\n").unwrap();

    assert_eq!(container.refresh().await.unwrap(), RefreshOutcome::Unchanged);
    assert!(container.updates().try_recv().is_none());

    container.close().await;
}

#[tokio::test]
async fn should_refresh_on_file_system_notifications() {
    let root = create_root("10.0.0.1 before\n");
    let watcher = NotifyWatcher::new(root.path()).unwrap();
    let container =
        HostsContainer::new(1, DirFs::new(root.path()), watcher, RewriteCompiler, &[
            "etc/hosts",
        ])
        .await
        .unwrap();
    let rx = container.updates();
    next_table(&rx).await;

    // Replace the file the way editors do, the watcher must follow the new one.
    let staged = root.path().join("etc/hosts.new");
    std::fs::write(&staged, "10.0.0.2 after\n").unwrap();
    std::fs::rename(&staged, root.path().join("etc/hosts")).unwrap();

    let after = IpAddr::from([10, 0, 0, 2]);
    let table = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let table = next_table(&rx).await;
            if table.get(&after).is_some() {
                break table;
            }
        }
    })
    .await
    .expect("hosts file change not observed");
    assert_eq!(table.get(&after).unwrap().main, "after");
    assert_eq!(
        lookup(&container, "after", RecordType::A),
        vec![IpAddr::from([10, 0, 0, 2])]
    );

    container.close().await;
}
