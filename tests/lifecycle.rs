//! End-to-end client behavior against the in-memory registry and a stub
//! REST registry server.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use eureka_agent::config::{Config, ServiceUrlConfig};
use eureka_agent::test_utils::{MockTransport, TransportCall};
use eureka_agent::{
    Application, ClientError, EurekaClient, Instance, InstanceStatus, PortInfo,
    RegistrationState, RegistryTransport, RestTransport, ShutdownOutcome, TransportError,
};

fn peer(id: &str, ip: &str) -> Instance {
    Instance {
        instance_id: id.to_string(),
        app: "BILLING".to_string(),
        ip_addr: ip.to_string(),
        host_name: ip.to_string(),
        port: PortInfo::enabled(9000),
        secure_port: PortInfo::enabled(9443),
        status: InstanceStatus::Up,
        ..Default::default()
    }
}

fn agent_config() -> Config {
    let mut config = Config::for_test();
    config.client.fetch_registry = true;
    config.instance.app_name = "orders".to_string();
    config.instance.ip_address = "10.1.0.7".to_string();
    config.instance.instance_enabled_on_init = true;
    config
}

#[tokio::test(start_paused = true)]
async fn test_full_lifecycle() {
    let transport = Arc::new(MockTransport::new());
    transport
        .put_application(Application::new(
            "BILLING",
            vec![peer("b1", "10.2.0.1"), peer("b2", "10.2.0.2")],
        ))
        .await;
    let client = EurekaClient::new(agent_config(), transport.clone());

    client.run().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(client.registration_state().await, RegistrationState::Up);

    // The next bulk fetch sees this instance as UP.
    tokio::time::sleep(Duration::from_secs(30)).await;
    let own = client.get_next_instance("ORDERS").await.unwrap();
    assert_eq!(own.instance_id, "10.1.0.7:orders:8080");
    assert_eq!(
        client.resolve_url("http://orders/health").await.unwrap(),
        "http://10.1.0.7:8080/health"
    );

    let first = client.resolve_url("https://BILLING/pay").await.unwrap();
    let second = client.resolve_url("https://BILLING/pay").await.unwrap();
    assert_ne!(first, second);
    assert!(first.starts_with("https://10.2.0."));
    assert!(first.ends_with(":9443/pay"));

    assert_eq!(
        client.shutdown().await.unwrap(),
        ShutdownOutcome::Deregistered
    );
    client.halt().await;

    let calls = transport.calls().await;
    let register = calls
        .iter()
        .position(|c| matches!(c, TransportCall::Register { .. }))
        .unwrap();
    let promote = calls
        .iter()
        .position(|c| matches!(c, TransportCall::UpdateStatus { status: InstanceStatus::Up, .. }))
        .unwrap();
    let deregister = calls
        .iter()
        .position(|c| matches!(c, TransportCall::Deregister { .. }))
        .unwrap();
    assert!(register < promote);
    assert!(promote < deregister);
    assert!(calls
        .iter()
        .any(|c| matches!(c, TransportCall::Heartbeat { app, .. } if app == "ORDERS")));

    assert!(transport
        .registered_instance("ORDERS", "10.1.0.7:orders:8080")
        .await
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_keep_going_through_outages() {
    let transport = Arc::new(MockTransport::new());
    let mut config = agent_config();
    config.instance.lease_renewal_interval_secs = 5;
    let client = EurekaClient::new(config, transport.clone());

    client.run().await;
    transport.set_fail_on_heartbeat(true).await;
    transport.set_fail_on_query(true).await;
    tokio::time::sleep(Duration::from_secs(21)).await;
    let during_outage = transport.heartbeat_count().await;
    assert!(during_outage >= 4);

    transport.set_fail_on_heartbeat(false).await;
    transport.set_fail_on_query(false).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.heartbeat_count().await, during_outage + 2);
    assert!(client.is_running().await);

    client.halt().await;
}

#[tokio::test]
async fn test_lookup_of_unknown_application() {
    let transport = Arc::new(MockTransport::new());
    transport.set_fail_on_query(true).await;
    let client = EurekaClient::new(agent_config(), transport.clone());

    let result = client.resolve_url("http://UNKNOWN/").await;

    assert!(matches!(result, Err(ClientError::NotFound(app)) if app == "UNKNOWN"));
    assert!(client.applications().await.is_empty());
}

// REST transport against a stub registry

/// Serve one canned response per connection, reporting each request line.
async fn stub_registry(responses: Vec<(u16, &'static str)>) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/eureka", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let _ = tx.send(request.lines().next().unwrap_or_default().to_string());

            let response = format!(
                "HTTP/1.1 {} STUB\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
    });

    (base, rx)
}

fn rest_transport(base: &str) -> RestTransport {
    RestTransport::new(&ServiceUrlConfig {
        default_zone: format!("{}/", base),
        timeout_secs: 5,
    })
    .unwrap()
}

const BILLING_JSON: &str = r#"{
  "application": {
    "name": "BILLING",
    "instance": {
      "instanceId": "b1",
      "hostName": "billing-1",
      "app": "BILLING",
      "ipAddr": "10.2.0.1",
      "status": "UP",
      "port": {"$": 9000, "@enabled": "true"},
      "securePort": {"$": 9443, "@enabled": "false"}
    }
  }
}"#;

#[tokio::test]
async fn test_rest_query_application() {
    let (base, mut requests) = stub_registry(vec![(200, BILLING_JSON)]).await;
    let transport = rest_transport(&base);

    let application = transport.query_application("billing").await.unwrap();

    assert_eq!(requests.recv().await.unwrap(), "GET /eureka/apps/BILLING HTTP/1.1");
    assert_eq!(application.name, "BILLING");
    assert_eq!(application.instances.len(), 1);
    let instance = &application.instances[0];
    assert_eq!(instance.instance_id, "b1");
    assert_eq!(instance.plain_endpoint(), "10.2.0.1:9000");
    assert!(!instance.secure_port.enabled);
    assert!(instance.is_up());
}

#[tokio::test]
async fn test_rest_unknown_application_is_not_found() {
    let (base, _requests) = stub_registry(vec![(404, "")]).await;
    let transport = rest_transport(&base);

    let result = transport.query_application("GHOST").await;

    assert!(matches!(result, Err(TransportError::NotFound(app)) if app == "GHOST"));
}

#[tokio::test]
async fn test_rest_query_retries_server_errors() {
    let (base, mut requests) = stub_registry(vec![
        (503, ""),
        (200, r#"{"applications": {"application": []}}"#),
    ])
    .await;
    let transport = rest_transport(&base);

    let applications = transport.query_all().await.unwrap();

    assert!(applications.is_empty());
    assert_eq!(requests.recv().await.unwrap(), "GET /eureka/apps HTTP/1.1");
    assert_eq!(requests.recv().await.unwrap(), "GET /eureka/apps HTTP/1.1");
}

#[tokio::test]
async fn test_rest_lease_calls() {
    let (base, mut requests) = stub_registry(vec![(200, ""), (200, ""), (200, "")]).await;
    let transport = rest_transport(&base);

    transport.heartbeat("ORDERS", "o1").await.unwrap();
    transport
        .update_status("ORDERS", "o1", InstanceStatus::Up)
        .await
        .unwrap();
    transport.deregister("ORDERS", "o1").await.unwrap();

    assert_eq!(requests.recv().await.unwrap(), "PUT /eureka/apps/ORDERS/o1 HTTP/1.1");
    assert_eq!(
        requests.recv().await.unwrap(),
        "PUT /eureka/apps/ORDERS/o1/status?value=UP HTTP/1.1"
    );
    assert_eq!(requests.recv().await.unwrap(), "DELETE /eureka/apps/ORDERS/o1 HTTP/1.1");
}

#[tokio::test]
async fn test_rest_rejected_heartbeat_is_an_error() {
    let (base, _requests) = stub_registry(vec![(404, "")]).await;
    let transport = rest_transport(&base);

    let result = transport.heartbeat("ORDERS", "o1").await;

    assert!(matches!(
        result,
        Err(TransportError::Status { status: 404, method: "PUT", .. })
    ));
}
