//! Remediation engine tests over fake providers: denial parsing through
//! policy resolution and attachment, including the duplicate-name creation
//! race and idempotent re-remediation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use clouddeck::remediation::{
    CreatePolicyOutcome, IdentityProvider, PermissionRemediator, PolicyDocument, PolicyProvider,
    PolicySummary, ProviderError, RemediationError,
};

const DENIAL: &str = "You are not authorized to perform this operation. \
    User: arn:aws:iam::111111111:user/s3readwrite is not authorized to perform: \
    ec2:DescribeLaunchTemplates because no identity-based policy allows the \
    ec2:DescribeLaunchTemplates action";

const POLICY_NAME: &str = "Custom-ec2-DescribeLaunchTemplates-Permission";

struct FakeIdentity {
    arn: Option<String>,
    calls: AtomicU64,
}

impl FakeIdentity {
    fn user(arn: &str) -> Arc<FakeIdentity> {
        Arc::new(FakeIdentity { arn: Some(arn.to_string()), calls: AtomicU64::new(0) })
    }

    fn unreachable_provider() -> Arc<FakeIdentity> {
        Arc::new(FakeIdentity { arn: None, calls: AtomicU64::new(0) })
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn caller_identity_arn(&self) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.arn
            .clone()
            .ok_or_else(|| ProviderError("sts endpoint unreachable".to_string()))
    }
}

#[derive(Default)]
struct FakePolicies {
    policies: Mutex<Vec<PolicySummary>>,
    /// Policies that exist provider-side but are not yet visible in listings;
    /// revealed by the first create attempt. Models a lost creation race.
    hidden: Mutex<Vec<PolicySummary>>,
    list_calls: AtomicU64,
    create_calls: AtomicU64,
    attachments: Mutex<Vec<(String, String)>>,
    fail_create: Option<String>,
    fail_attach: Option<String>,
}

impl FakePolicies {
    fn empty() -> Arc<FakePolicies> {
        Arc::new(FakePolicies::default())
    }

    fn with_existing(name: &str, arn: &str) -> Arc<FakePolicies> {
        let fake = FakePolicies::default();
        fake.policies
            .try_lock()
            .unwrap()
            .push(PolicySummary { name: name.to_string(), arn: arn.to_string() });
        Arc::new(fake)
    }

    /// A policy that a concurrent remediator already created: absent from
    /// listings until our own create attempt collides with it.
    fn with_phantom(name: &str, arn: &str) -> Arc<FakePolicies> {
        let fake = FakePolicies::default();
        fake.hidden
            .try_lock()
            .unwrap()
            .push(PolicySummary { name: name.to_string(), arn: arn.to_string() });
        Arc::new(fake)
    }

    async fn policy_count(&self) -> usize {
        self.policies.lock().await.len()
    }

    async fn attached(&self) -> Vec<(String, String)> {
        self.attachments.lock().await.clone()
    }
}

#[async_trait]
impl PolicyProvider for FakePolicies {
    async fn list_local_policies(&self) -> Result<Vec<PolicySummary>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.policies.lock().await.clone())
    }

    async fn create_policy(
        &self,
        name: &str,
        _document: &PolicyDocument,
        _description: &str,
    ) -> Result<CreatePolicyOutcome, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(message) = &self.fail_create {
            return Err(ProviderError(message.clone()));
        }
        let mut policies = self.policies.lock().await;
        // Name collision is the provider's conflict detection.
        {
            let mut hidden = self.hidden.lock().await;
            policies.append(&mut hidden);
        }
        if policies.iter().any(|p| p.name == name) {
            return Ok(CreatePolicyOutcome::AlreadyExists);
        }
        let arn = format!("arn:aws:iam::111111111:policy/{name}");
        policies.push(PolicySummary { name: name.to_string(), arn: arn.clone() });
        Ok(CreatePolicyOutcome::Created { arn })
    }

    async fn attach_user_policy(
        &self,
        user_name: &str,
        policy_arn: &str,
    ) -> Result<(), ProviderError> {
        if let Some(message) = &self.fail_attach {
            return Err(ProviderError(message.clone()));
        }
        self.attachments
            .lock()
            .await
            .push((user_name.to_string(), policy_arn.to_string()));
        Ok(())
    }
}

fn remediator(identity: Arc<FakeIdentity>, policies: Arc<FakePolicies>) -> PermissionRemediator {
    PermissionRemediator::new(identity, policies)
}

#[tokio::test]
async fn denial_creates_policy_and_attaches_to_caller() {
    let identity = FakeIdentity::user("arn:aws:iam::111111111:user/s3readwrite");
    let policies = FakePolicies::empty();
    let engine = remediator(identity, policies.clone());

    let outcome = engine.remediate(DENIAL).await.expect("remediation should succeed");
    assert!(outcome.summary.contains("ec2:DescribeLaunchTemplates"));
    assert!(outcome.summary.contains("s3readwrite"));

    assert_eq!(policies.policy_count().await, 1);
    assert_eq!(policies.create_calls.load(Ordering::Relaxed), 1);
    let attached = policies.attached().await;
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].0, "s3readwrite");
    assert_eq!(attached[0].1, format!("arn:aws:iam::111111111:policy/{POLICY_NAME}"));
}

#[tokio::test]
async fn unrecognized_error_makes_no_provider_calls() {
    let identity = FakeIdentity::user("arn:aws:iam::111111111:user/s3readwrite");
    let policies = FakePolicies::empty();
    let engine = remediator(identity.clone(), policies.clone());

    let err = engine.remediate("access denied").await.unwrap_err();
    assert!(matches!(err, RemediationError::Parse(_)));

    assert_eq!(identity.calls.load(Ordering::Relaxed), 0);
    assert_eq!(policies.list_calls.load(Ordering::Relaxed), 0);
    assert_eq!(policies.create_calls.load(Ordering::Relaxed), 0);
    assert!(policies.attached().await.is_empty());
}

#[tokio::test]
async fn second_remediation_reuses_the_first_policy() {
    let identity = FakeIdentity::user("arn:aws:iam::111111111:user/s3readwrite");
    let policies = FakePolicies::empty();
    let engine = remediator(identity, policies.clone());

    engine.remediate(DENIAL).await.expect("first attempt");
    engine.remediate(DENIAL).await.expect("second attempt");

    // Exactly one policy document exists; the second pass reused its ARN and
    // still attempted attachment.
    assert_eq!(policies.policy_count().await, 1);
    assert_eq!(policies.create_calls.load(Ordering::Relaxed), 1);
    let attached = policies.attached().await;
    assert_eq!(attached.len(), 2);
    assert_eq!(attached[0].1, attached[1].1);
}

#[tokio::test]
async fn existing_policy_is_reused_and_attachment_still_attempted() {
    let identity = FakeIdentity::user("arn:aws:iam::111111111:user/s3readwrite");
    let policies = FakePolicies::with_existing(POLICY_NAME, "arn:aws:iam::111111111:policy/preexisting");
    let engine = remediator(identity, policies.clone());

    let outcome = engine.remediate(DENIAL).await.expect("remediation should succeed");
    assert!(outcome.summary.contains("s3readwrite"));

    // No synthesis happened, but the attach was not skipped.
    assert_eq!(policies.create_calls.load(Ordering::Relaxed), 0);
    let attached = policies.attached().await;
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].1, "arn:aws:iam::111111111:policy/preexisting");
}

#[tokio::test]
async fn lost_creation_race_is_absorbed_by_relisting() {
    let identity = FakeIdentity::user("arn:aws:iam::111111111:user/s3readwrite");
    let policies = FakePolicies::with_phantom(POLICY_NAME, "arn:aws:iam::111111111:policy/theirs");
    let engine = remediator(identity, policies.clone());

    // Listing misses the policy, creation collides, relisting resolves it.
    let outcome = engine.remediate(DENIAL).await.expect("conflict must be absorbed");
    assert!(outcome.summary.contains("ec2:DescribeLaunchTemplates"));

    assert_eq!(policies.create_calls.load(Ordering::Relaxed), 1);
    assert_eq!(policies.list_calls.load(Ordering::Relaxed), 2);
    let attached = policies.attached().await;
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].1, "arn:aws:iam::111111111:policy/theirs");
}

#[tokio::test]
async fn concurrent_attempts_for_same_denial_converge() {
    let identity = FakeIdentity::user("arn:aws:iam::111111111:user/s3readwrite");
    let policies = FakePolicies::empty();
    let a = remediator(identity.clone(), policies.clone());
    let b = remediator(identity, policies.clone());

    let (ra, rb) = tokio::join!(a.remediate(DENIAL), b.remediate(DENIAL));
    ra.expect("first concurrent attempt");
    rb.expect("second concurrent attempt");

    // Regardless of interleaving: one policy, both attachments, same ARN.
    assert_eq!(policies.policy_count().await, 1);
    let attached = policies.attached().await;
    assert_eq!(attached.len(), 2);
    assert_eq!(attached[0].1, attached[1].1);
}

#[tokio::test]
async fn identity_failure_is_fatal_and_stops_the_pipeline() {
    let identity = FakeIdentity::unreachable_provider();
    let policies = FakePolicies::empty();
    let engine = remediator(identity, policies.clone());

    let err = engine.remediate(DENIAL).await.unwrap_err();
    assert!(matches!(err, RemediationError::Identity(_)));
    assert_eq!(policies.list_calls.load(Ordering::Relaxed), 0);
    assert!(policies.attached().await.is_empty());
}

#[tokio::test]
async fn malformed_caller_arn_fails_identity_resolution() {
    let identity = FakeIdentity::user("arn:aws:iam::111111111:root");
    let policies = FakePolicies::empty();
    let engine = remediator(identity, policies.clone());

    let err = engine.remediate(DENIAL).await.unwrap_err();
    assert!(matches!(err, RemediationError::Identity(_)));
    assert!(policies.attached().await.is_empty());
}

#[tokio::test]
async fn non_conflict_creation_failure_propagates() {
    let identity = FakeIdentity::user("arn:aws:iam::111111111:user/s3readwrite");
    let policies = Arc::new(FakePolicies {
        fail_create: Some("not authorized to create policies".to_string()),
        ..FakePolicies::default()
    });
    let engine = remediator(identity, policies.clone());

    let err = engine.remediate(DENIAL).await.unwrap_err();
    assert!(matches!(err, RemediationError::PolicyCreation(_)));
    assert!(policies.attached().await.is_empty());
}

#[tokio::test]
async fn attachment_failure_propagates_without_retry() {
    let identity = FakeIdentity::user("arn:aws:iam::111111111:user/s3readwrite");
    let policies = Arc::new(FakePolicies {
        fail_attach: Some("iam:AttachUserPolicy denied".to_string()),
        ..FakePolicies::default()
    });
    let engine = remediator(identity, policies.clone());

    let err = engine.remediate(DENIAL).await.unwrap_err();
    assert!(matches!(err, RemediationError::Attachment(_)));
    // The policy was still created; only the commit failed.
    assert_eq!(policies.create_calls.load(Ordering::Relaxed), 1);
}
