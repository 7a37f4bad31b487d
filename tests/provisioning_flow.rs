//! End-to-end tests of the gated provisioning run
//!
//! A wiremock server stands in for the management API and an in-memory
//! transport records alerts.

use async_trait::async_trait;
use hxpolicy::alert::message::MailMessage;
use hxpolicy::alert::{AlertStatus, Alerter, MailTransport};
use hxpolicy::api::{Credentials, HttpClient, ResourceClient};
use hxpolicy::context::AccountContext;
use hxpolicy::gate::{GateVerdict, Unavailable};
use hxpolicy::policy::{default_policies, indexed_label, PolicySpec, Provisioner};
use hxpolicy::workflow::{Run, RunStatus};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct CountingTransport {
    sent: AtomicUsize,
}

#[async_trait]
impl MailTransport for CountingTransport {
    async fn send(&self, _message: &MailMessage) -> anyhow::Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct HangingTransport {
    calls: AtomicUsize,
}

#[async_trait]
impl MailTransport for HangingTransport {
    async fn send(&self, _message: &MailMessage) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

fn client_for(base: &str) -> ResourceClient {
    let http = HttpClient::new(Duration::from_secs(2), Duration::from_secs(5)).unwrap();
    ResourceClient::new(base, Credentials::from_token("test-token"), http).unwrap()
}

fn alerter(transport: Arc<dyn MailTransport>) -> Alerter {
    Alerter::new(
        transport,
        "alerts@example.com",
        vec!["ops@example.com".to_string()],
        Duration::from_millis(300),
    )
}

fn context() -> AccountContext {
    AccountContext {
        name: "demo-account".to_string(),
        session_id: "777".to_string(),
        ..AccountContext::default()
    }
}

async fn mount_account(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/api/v1/iam/Accounts"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "Results": [{"Name": "demo-account"}]
        })))
        .mount(server)
        .await;
}

async fn post_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .count()
}

mod gate_tests {
    use super::*;

    /// A healthy account passes and every policy is created
    #[tokio::test]
    async fn test_gate_pass_submits_every_policy() {
        let server = MockServer::start().await;
        mount_account(&server, 200).await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/api/v1/hyperflex/.+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Moid": "x"})))
            .mount(&server)
            .await;

        let client = client_for(&format!("{}/api/v1", server.uri()));
        let transport = Arc::new(CountingTransport::default());
        let alerter = alerter(transport.clone());
        let ctx = context();
        let run = Run {
            client: &client,
            alerter: &alerter,
            context: &ctx,
            attachments: &[],
        };

        let specs = default_policies().to_vec();
        let (status, report) = run.provision(&specs, 1).await;

        assert_eq!(status, RunStatus::Completed);
        assert_eq!(report.unwrap().succeeded(), specs.len());
        assert_eq!(post_count(&server).await, specs.len());
        assert_eq!(transport.sent.load(Ordering::SeqCst), 0);
    }

    /// The account name from the identity read is reported
    #[tokio::test]
    async fn test_gate_pass_reports_account_name() {
        let server = MockServer::start().await;
        mount_account(&server, 200).await;

        let client = client_for(&format!("{}/api/v1", server.uri()));
        let alerter = alerter(Arc::new(CountingTransport::default()));
        let ctx = context();
        let run = Run {
            client: &client,
            alerter: &alerter,
            context: &ctx,
            attachments: &[],
        };

        assert_eq!(
            run.check().await,
            GateVerdict::Pass(Some("demo-account".to_string()))
        );
    }

    /// Non-200 fails the gate: one alert, no policy submitted
    #[tokio::test]
    async fn test_gate_status_failure_alerts_once_and_submits_nothing() {
        let server = MockServer::start().await;
        mount_account(&server, 401).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&format!("{}/api/v1", server.uri()));
        let transport = Arc::new(CountingTransport::default());
        let alerter = alerter(transport.clone());
        let ctx = context();
        let run = Run {
            client: &client,
            alerter: &alerter,
            context: &ctx,
            attachments: &[],
        };

        let (status, report) = run.provision(default_policies(), 1).await;

        assert_eq!(status, RunStatus::GateFailed);
        assert!(report.is_none());
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
        assert_eq!(post_count(&server).await, 0);
    }

    /// A 2xx other than 200 still fails the identity check
    #[tokio::test]
    async fn test_gate_requires_exactly_200() {
        let server = MockServer::start().await;
        mount_account(&server, 202).await;

        let client = client_for(&format!("{}/api/v1", server.uri()));
        let alerter = alerter(Arc::new(CountingTransport::default()));
        let ctx = context();
        let run = Run {
            client: &client,
            alerter: &alerter,
            context: &ctx,
            attachments: &[],
        };

        match run.check().await {
            GateVerdict::Fail { reason, alert } => {
                assert_eq!(reason, Unavailable::Status(202));
                assert_eq!(alert, AlertStatus::Sent);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    /// An unreachable API fails the gate and alerts once
    #[tokio::test]
    async fn test_gate_unreachable_alerts_once() {
        let client = client_for("http://127.0.0.1:1/api/v1");
        let transport = Arc::new(CountingTransport::default());
        let alerter = alerter(transport.clone());
        let ctx = context();
        let run = Run {
            client: &client,
            alerter: &alerter,
            context: &ctx,
            attachments: &[],
        };

        let (status, _) = run.provision(default_policies(), 1).await;

        assert_eq!(status, RunStatus::GateFailed);
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
    }

    /// A hanging mail transport does not hold up the failure path
    #[tokio::test]
    async fn test_gate_failure_is_bounded_when_mail_hangs() {
        let server = MockServer::start().await;
        mount_account(&server, 503).await;

        let client = client_for(&format!("{}/api/v1", server.uri()));
        let transport = Arc::new(HangingTransport {
            calls: AtomicUsize::new(0),
        });
        let alerter = alerter(transport.clone());
        let ctx = context();
        let attachments = vec![PathBuf::from("/no/such/session.xml")];
        let run = Run {
            client: &client,
            alerter: &alerter,
            context: &ctx,
            attachments: &attachments,
        };

        let started = Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(5), run.check()).await;

        let verdict = result.expect("gate failure path should finish promptly");
        assert!(matches!(
            verdict,
            GateVerdict::Fail {
                alert: AlertStatus::TimedOut,
                ..
            }
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

mod provisioner_tests {
    use super::*;

    fn specs_with_malformed() -> Vec<PolicySpec> {
        vec![
            PolicySpec::new("hyperflex/SysConfigPolicies", json!({"Name": "ok-1"})),
            PolicySpec::new("hyperflex/SysConfigPolicies", json!({"Name": 42, "Bogus": [null]})),
            PolicySpec::new("hyperflex/ClusterStoragePolicies", json!({"Name": "ok-2"})),
            PolicySpec::new("hyperflex/ClusterStoragePolicies", json!("not an object")),
            PolicySpec::new("hyperflex/NodeConfigPolicies", json!({"Name": "ok-3"})),
        ]
    }

    async fn mount_selective(server: &MockServer) {
        // The server rejects the malformed bodies and accepts the rest
        Mock::given(method("POST"))
            .and(wiremock::matchers::body_json(json!({"Name": 42, "Bogus": [null]})))
            .respond_with(ResponseTemplate::new(400))
            .with_priority(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(wiremock::matchers::body_json(json!("not an object")))
            .respond_with(ResponseTemplate::new(400))
            .with_priority(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Moid": "m"})))
            .with_priority(5)
            .mount(server)
            .await;
    }

    /// Every spec is submitted even when some fail
    #[tokio::test]
    async fn test_apply_submits_all_despite_failures() {
        let server = MockServer::start().await;
        mount_selective(&server).await;

        let client = client_for(&format!("{}/api/v1", server.uri()));
        let specs = specs_with_malformed();
        let report = Provisioner::new(&client).apply(&specs).await;

        assert_eq!(post_count(&server).await, specs.len());
        assert_eq!(report.total(), 5);
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.failed(), 2);
        assert_eq!(
            report.failures().collect::<Vec<_>>(),
            vec![
                "#2 hyperflex/SysConfigPolicies",
                "#4 hyperflex/ClusterStoragePolicies"
            ]
        );
    }

    /// Partial failure maps to its own run status
    #[tokio::test]
    async fn test_partial_failure_status() {
        let server = MockServer::start().await;
        mount_account(&server, 200).await;
        mount_selective(&server).await;

        let client = client_for(&format!("{}/api/v1", server.uri()));
        let alerter = alerter(Arc::new(CountingTransport::default()));
        let ctx = context();
        let run = Run {
            client: &client,
            alerter: &alerter,
            context: &ctx,
            attachments: &[],
        };

        let (status, _) = run.provision(&specs_with_malformed(), 1).await;
        assert_eq!(status, RunStatus::PartialFailure);
        assert_eq!(status.exit_code(), 3);
    }

    /// Concurrent apply issues the same calls and keeps report order
    #[tokio::test]
    async fn test_apply_concurrent_keeps_order() {
        let server = MockServer::start().await;
        mount_selective(&server).await;

        let client = client_for(&format!("{}/api/v1", server.uri()));
        let specs = specs_with_malformed();
        let report = Provisioner::new(&client).apply_concurrent(&specs, 3).await;

        assert_eq!(post_count(&server).await, specs.len());
        let labels: Vec<_> = report.results.iter().map(|(l, _)| l.clone()).collect();
        let expected: Vec<_> = specs
            .iter()
            .enumerate()
            .map(|(i, s)| indexed_label(i, s))
            .collect();
        assert_eq!(labels, expected);
        assert_eq!(report.failed(), 2);
    }

    /// Unnamed specs on the same path still fail under distinct labels
    #[tokio::test]
    async fn test_failures_distinguish_same_path_specs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let client = client_for(&format!("{}/api/v1", server.uri()));
        let specs = vec![
            PolicySpec::new("hyperflex/SysConfigPolicies", json!({"Timezone": "UTC"})),
            PolicySpec::new("hyperflex/SysConfigPolicies", json!({"Timezone": "CET"})),
        ];
        let report = Provisioner::new(&client).apply(&specs).await;

        let failures: Vec<_> = report.failures().collect();
        assert_eq!(
            failures,
            vec![
                "#1 hyperflex/SysConfigPolicies",
                "#2 hyperflex/SysConfigPolicies"
            ]
        );
        assert_ne!(failures[0], failures[1]);
    }

    /// Applying twice creates everything twice; there is no deduplication
    #[tokio::test]
    async fn test_apply_twice_duplicates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Moid": "m"})))
            .mount(&server)
            .await;

        let client = client_for(&format!("{}/api/v1", server.uri()));
        let specs = default_policies();
        let provisioner = Provisioner::new(&client);
        provisioner.apply(specs).await;
        provisioner.apply(specs).await;

        assert_eq!(post_count(&server).await, specs.len() * 2);
    }
}
