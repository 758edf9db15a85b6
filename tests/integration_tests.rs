//! End-to-end test suite for the collaborative detection engine
//!
//! Drives full nodes over the in-memory bus and verifies:
//! - Victim detection by absolute threshold and by traffic increase
//! - Priority topic selection and candidate chunking
//! - Deep heavy-hitter confirmation on behalf of peers
//! - Self-echo suppression and reputation accounting

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;

use sentinel_mesh::collab::bus::{BusConsumer, InMemoryBus};
use sentinel_mesh::collab::client::{CollabClient, RequestOrigin};
use sentinel_mesh::collab::message::{CollabRequest, CollabResponse, Decision, Detection};
use sentinel_mesh::config::NodeConfig;
use sentinel_mesh::detection::analysis::{Analysis, HeavyHitterAnalysis, VolumetricAttackAnalysis};
use sentinel_mesh::detection::counters::TrafficCounters;
use sentinel_mesh::detection::ingest::Ingestor;
use sentinel_mesh::detection::membership::ManagedIps;
use sentinel_mesh::detection::{PacketRecord, Transport};
use sentinel_mesh::mitigation::Mitigation;
use sentinel_mesh::node::SentinelNode;

const POLL_TIMEOUT: Duration = Duration::from_millis(300);

struct RecordingMitigation {
    filtered: Mutex<Vec<Vec<String>>>,
}

impl RecordingMitigation {
    fn new() -> Arc<Self> {
        Arc::new(RecordingMitigation {
            filtered: Mutex::new(Vec::new()),
        })
    }

    fn all(&self) -> Vec<Vec<String>> {
        self.filtered.lock().unwrap().clone()
    }
}

impl Mitigation for RecordingMitigation {
    fn filter(&self, ips: &[String]) {
        if !ips.is_empty() {
            self.filtered.lock().unwrap().push(ips.to_vec());
        }
    }
}

fn test_config(as_name: &str) -> NodeConfig {
    NodeConfig {
        as_name: as_name.to_string(),
        as_size: 1,
        sampling_rate: 1.0,
        msg_length: 2,
        use_hash: false,
        topic_high: "AS.HIGH".to_string(),
        topic_low: "AS.LOW".to_string(),
        threshold_victim_lo: 100,
        threshold_victim_hi: 1000,
        threshold_victim_time_min: 50.0,
        threshold_victim_time_percentage: 2.0,
        threshold_src_1: 50.0,
        threshold_src_2: 200.0,
        threshold_src_3: 0.8,
        threshold_src_3_min: 20.0,
        threshold_traffic_proportionality: 10.0,
        ..NodeConfig::default()
    }
}

struct TestNode {
    node: Arc<SentinelNode>,
    client: Arc<CollabClient>,
    ingestor: Ingestor,
    mitigation: Arc<RecordingMitigation>,
}

fn build_node(config: NodeConfig, managed: &[&str], bus: Arc<InMemoryBus>) -> TestNode {
    let config = Arc::new(config);
    let counters = Arc::new(TrafficCounters::new());
    let managed = Arc::new(ManagedIps::from_entries(managed.iter().copied(), false));
    let mitigation = RecordingMitigation::new();
    let attack: Arc<dyn Analysis> = Arc::new(VolumetricAttackAnalysis::new(config.clone()));
    let attacker: Arc<dyn Analysis> = Arc::new(HeavyHitterAnalysis::new(config.clone()));

    let client = Arc::new(CollabClient::new(
        config.clone(),
        counters.clone(),
        managed.clone(),
        attacker,
        mitigation.clone(),
        bus,
    ));
    let node = Arc::new(SentinelNode::new(
        config.clone(),
        counters.clone(),
        client.clone(),
        attack,
        mitigation.clone(),
    ));
    let ingestor = Ingestor::new(counters, managed, &config);

    TestNode {
        node,
        client,
        ingestor,
        mitigation,
    }
}

fn packet(src: &str, dst: &str) -> PacketRecord {
    PacketRecord::new(src, dst, "40000", "80", Transport::Udp)
}

fn ingest_many(node: &TestNode, src: &str, dst: &str, count: usize) {
    for _ in 0..count {
        node.ingestor.observe(&packet(src, dst));
    }
}

async fn next_request(consumer: &mut dyn BusConsumer) -> CollabRequest {
    let record = timeout(POLL_TIMEOUT, consumer.poll())
        .await
        .expect("no request on topic")
        .expect("subscription closed");
    serde_json::from_slice(&record.payload).expect("payload is a request")
}

async fn expect_silence(consumer: &mut dyn BusConsumer) {
    assert!(
        timeout(Duration::from_millis(100), consumer.poll()).await.is_err(),
        "unexpected record on topic"
    );
}

#[tokio::test]
async fn threshold_detection_publishes_one_low_priority_request() {
    let bus = Arc::new(InMemoryBus::new());
    let mut low = bus.subscribe(&["AS.LOW.REQ".to_string()]);
    let mut high = bus.subscribe(&["AS.HIGH.REQ".to_string()]);
    let node = build_node(test_config("AS-X"), &[], bus);

    ingest_many(&node, "A", "V", 101);
    node.node.analyze_window().await;

    let request = next_request(&mut low).await;
    assert_eq!(request.potential_attacker_ips, vec!["A".to_string()]);
    assert_eq!(request.potential_victim, "V");
    assert_eq!(request.request_detection, Detection::Threshold);
    assert_eq!(request.requests_relative_to_size, 101.0);
    assert_eq!(request.request_originator, "AS-X");

    expect_silence(&mut low).await;
    expect_silence(&mut high).await;
}

#[tokio::test]
async fn certain_attacks_split_into_ordered_chunks_on_the_high_topic() {
    let bus = Arc::new(InMemoryBus::new());
    let mut high = bus.subscribe(&["AS.HIGH.REQ".to_string()]);
    let mut low = bus.subscribe(&["AS.LOW.REQ".to_string()]);
    let node = build_node(test_config("AS-X"), &[], bus);

    for src in ["A", "B", "C", "D", "E"] {
        ingest_many(&node, src, "V", 500);
    }
    node.node.analyze_window().await;

    let mut chunks = Vec::new();
    for _ in 0..3 {
        chunks.push(next_request(&mut high).await.potential_attacker_ips);
    }
    assert_eq!(chunks[0], vec!["A".to_string(), "B".to_string()]);
    assert_eq!(chunks[1], vec!["C".to_string(), "D".to_string()]);
    assert_eq!(chunks[2], vec!["E".to_string()]);

    expect_silence(&mut high).await;
    expect_silence(&mut low).await;
}

#[tokio::test]
async fn traffic_increase_is_beaten_by_the_absolute_threshold() {
    let bus = Arc::new(InMemoryBus::new());
    let mut low = bus.subscribe(&["AS.LOW.REQ".to_string()]);
    let node = build_node(test_config("AS-X"), &[], bus);

    // tick 1: below everything
    ingest_many(&node, "A", "V", 80);
    node.node.analyze_window().await;
    expect_silence(&mut low).await;

    // tick 2: ratio 90/80 = 1.125, under the increase threshold
    ingest_many(&node, "A", "V", 90);
    node.node.analyze_window().await;
    expect_silence(&mut low).await;

    // tick 3: ratio 200/90 would fire, but the absolute threshold wins
    ingest_many(&node, "A", "V", 200);
    node.node.analyze_window().await;

    let request = next_request(&mut low).await;
    assert_eq!(request.request_detection, Detection::Threshold);
    assert_eq!(request.requests_relative_to_size, 200.0);
}

#[tokio::test]
async fn traffic_increase_fires_below_the_absolute_threshold() {
    let bus = Arc::new(InMemoryBus::new());
    let mut low = bus.subscribe(&["AS.LOW.REQ".to_string()]);
    let node = build_node(test_config("AS-X"), &[], bus);

    ingest_many(&node, "A", "V", 30);
    node.node.analyze_window().await;
    expect_silence(&mut low).await;

    // 90/30 = 3.0 > 2.0 and 90 clears the per-window minimum
    ingest_many(&node, "A", "V", 90);
    node.node.analyze_window().await;

    let request = next_request(&mut low).await;
    assert_eq!(request.request_detection, Detection::TrafficIncrease);
    assert!((request.requests_relative_to_size - 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn deep_analysis_confirms_a_concentrated_managed_source() {
    let bus = Arc::new(InMemoryBus::new());
    let mut res = bus.subscribe(&["AS.LOW.RES".to_string()]);
    let node = build_node(test_config("AS-X"), &["A"], bus);

    // managed source A sent 30 packets to V and nothing anywhere else
    ingest_many(&node, "A", "V", 30);

    let request = CollabRequest::new(
        "AS-REMOTE",
        "V",
        vec!["A".to_string()],
        Detection::Threshold,
        150.0,
    );
    node.client
        .handle_request(
            request,
            RequestOrigin::Bus {
                topic: "AS.LOW.REQ".to_string(),
                high_priority: false,
            },
        )
        .await;

    let record = timeout(POLL_TIMEOUT, res.poll()).await.unwrap().unwrap();
    let response: CollabResponse = serde_json::from_slice(&record.payload).unwrap();
    assert_eq!(response.decision, Decision::Found);
    assert_eq!(response.ack_potential_attacker_ips, vec!["A".to_string()]);
    assert_eq!(response.as_name, "AS-X");
    assert_eq!(response.request_originator, "AS-REMOTE");
}

#[tokio::test]
async fn deep_analysis_confirms_an_asymmetric_conversation() {
    let bus = Arc::new(InMemoryBus::new());
    let mut res = bus.subscribe(&["AS.LOW.RES".to_string()]);
    let node = build_node(test_config("AS-X"), &["A"], bus);

    // fifteen packets toward the victim, a single packet back
    ingest_many(&node, "A", "V", 15);
    ingest_many(&node, "V", "A", 1);

    let request = CollabRequest::new(
        "AS-REMOTE",
        "V",
        vec!["A".to_string()],
        Detection::Threshold,
        150.0,
    );
    node.client
        .handle_request(
            request,
            RequestOrigin::Bus {
                topic: "AS.LOW.REQ".to_string(),
                high_priority: false,
            },
        )
        .await;

    let record = timeout(POLL_TIMEOUT, res.poll()).await.unwrap().unwrap();
    let response: CollabResponse = serde_json::from_slice(&record.payload).unwrap();
    assert_eq!(response.decision, Decision::Found);
    assert_eq!(response.ack_potential_attacker_ips, vec!["A".to_string()]);
}

#[tokio::test]
async fn self_echoed_requests_produce_no_response() {
    let bus = Arc::new(InMemoryBus::new());
    let mut res = bus.subscribe(&["AS.LOW.RES".to_string()]);
    let node = build_node(test_config("AS-X"), &[], bus);

    let request = CollabRequest::new(
        "AS-X",
        "V",
        vec!["A".to_string()],
        Detection::Threshold,
        150.0,
    );
    node.client
        .handle_request(
            request,
            RequestOrigin::Bus {
                topic: "AS.LOW.REQ".to_string(),
                high_priority: false,
            },
        )
        .await;

    expect_silence(&mut res).await;
}

#[tokio::test]
async fn found_responses_credit_the_responder_and_mitigate() {
    let bus = Arc::new(InMemoryBus::new());
    let node = build_node(test_config("AS-X"), &[], bus);

    assert_eq!(node.client.reputation().score("AS-Y"), 1.0);

    node.client.handle_response(CollabResponse {
        ack_potential_attacker_ips: vec!["6.6.6.6".to_string()],
        decision: Decision::Found,
        as_name: "AS-Y".to_string(),
        request_id: "r-1".to_string(),
        request_originator: "AS-X".to_string(),
    });

    assert!((node.client.reputation().score("AS-Y") - 1.1).abs() < 1e-9);
    assert!(node.mitigation.all().contains(&vec!["6.6.6.6".to_string()]));
    assert!(node.client.heavy_hitters().contains("6.6.6.6"));
}

#[tokio::test]
async fn two_nodes_collaborate_over_the_bus() {
    let bus = Arc::new(InMemoryBus::new());

    // AS-X sees the attack; AS-Y manages the attacker
    let node_x = build_node(test_config("AS-X"), &[], bus.clone());
    let node_y = build_node(test_config("AS-Y"), &["A"], bus.clone());

    let consumer_x = bus.subscribe(&test_config("AS-X").consumer_topics());
    let consumer_y = bus.subscribe(&test_config("AS-Y").consumer_topics());
    {
        let client = node_x.client.clone();
        tokio::spawn(async move { client.listen(Box::new(consumer_x)).await });
    }
    {
        let client = node_y.client.clone();
        tokio::spawn(async move { client.listen(Box::new(consumer_y)).await });
    }

    // the attacker's upstream traffic as AS-Y observes it
    ingest_many(&node_y, "A", "V", 60);

    // the flood as AS-X observes it
    ingest_many(&node_x, "A", "V", 120);
    node_x.node.analyze_window().await;

    // AS-Y confirms A, AS-X tallies the FOUND response and credits AS-Y
    let mut credited = false;
    for _ in 0..50 {
        if (node_x.client.reputation().score("AS-Y") - 1.1).abs() < 1e-9 {
            credited = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(credited, "AS-Y was never credited for its FOUND response");
    assert!(node_x.client.heavy_hitters().contains("A"));
    assert!(node_x.mitigation.all().contains(&vec!["A".to_string()]));
}
