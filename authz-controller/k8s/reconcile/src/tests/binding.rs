use super::*;
use authz_controller_core::{FINALIZER, OWNER_LABEL, TEMPLATE_LABEL};
use authz_controller_k8s_api::{
    policy::PodSecurityPolicy, ClusterRole, ClusterRoleBinding, Role, RoleBinding, RoleRef,
};
use pretty_assertions::assert_eq;

fn role_ref(kind: &str, name: &str) -> RoleRef {
    RoleRef {
        api_group: "rbac.authorization.k8s.io".to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

/// Seeds the `readonly` -> `pod-readonly` templates and the `psp-1` policy template.
fn seed_readonly(test: &TestConfig) {
    test.template(mk_template(
        "pod-readonly",
        vec![
            mk_rule(&["get", "list", "watch"], &[""], &["pods"], &[]),
            mk_rule(&["use"], &["extensions"], &["podsecuritypolicies"], &["psp-1"]),
        ],
        &[],
    ));
    test.template(mk_template(
        "readonly",
        vec![mk_rule(
            &["get", "list", "watch"],
            &["apps", "extensions"],
            &["deployments"],
            &[],
        )],
        &["pod-readonly"],
    ));
    test.store.seed(mk_psp_template(
        "psp-1",
        json!({ "privileged": false, "runAsUser": { "rule": "MustRunAsNonRoot" } }),
    ));
}

#[tokio::test]
async fn project_binding_scenario() {
    let test = TestConfig::new();
    seed_readonly(&test);
    test.namespace("ns1", Some("p1"));
    test.project_binding(mk_prtb("p1", "b1", "p1", "readonly", "user1"));

    test.sync_project_binding("p1", "b1").await.unwrap();

    let role = test
        .store
        .fetch::<Role>(Some("ns1"), "readonly")
        .expect("role must exist");
    assert_eq!(
        role.rules,
        Some(vec![
            mk_rule(&["get", "list", "watch"], &["apps", "extensions"], &["deployments"], &[]),
            mk_rule(&["get", "list", "watch"], &[""], &["pods"], &[]),
            mk_rule(&["use"], &["extensions"], &["podsecuritypolicies"], &["psp-1"]),
        ])
    );
    assert_eq!(role.labels()[TEMPLATE_LABEL], "readonly");

    let rb = test
        .store
        .fetch::<RoleBinding>(Some("ns1"), "readonly-user1-uid-b1")
        .expect("role binding must exist");
    assert_eq!(rb.role_ref, role_ref("Role", "readonly"));
    assert_eq!(rb.subjects, Some(vec![mk_user("user1")]));
    assert_eq!(rb.labels()[OWNER_LABEL], "uid-b1");

    let psp = test
        .store
        .fetch::<PodSecurityPolicy>(None, "psp-1")
        .expect("psp must exist");
    assert_eq!(
        serde_json::to_value(&psp.spec).unwrap(),
        json!({ "privileged": false, "runAsUser": { "rule": "MustRunAsNonRoot" } })
    );
    assert_eq!(psp.labels()[OWNER_LABEL], "uid-b1");

    let binding = test
        .store
        .fetch::<ProjectRoleTemplateBinding>(Some("p1"), "b1")
        .unwrap();
    assert_eq!(binding.finalizers(), &[FINALIZER.to_string()]);
}

#[tokio::test]
async fn second_pass_writes_nothing() {
    let test = TestConfig::new();
    seed_readonly(&test);
    test.namespace("ns1", Some("p1"));
    test.namespace("ns2", Some("p1"));
    test.project_binding(mk_prtb("p1", "b1", "p1", "readonly", "user1"));

    test.sync_project_binding("p1", "b1").await.unwrap();
    assert!(!test.store.writes().is_empty());
    test.store.clear_writes();

    test.sync_project_binding("p1", "b1").await.unwrap();
    assert_eq!(test.store.writes(), vec![]);
}

#[tokio::test]
async fn fans_out_to_project_namespaces_only() {
    let test = TestConfig::new();
    seed_readonly(&test);
    test.namespace("ns1", Some("p1"));
    test.namespace("ns2", Some("p1"));
    test.namespace("other", Some("p2"));
    test.namespace("unlabeled", None);
    test.project_binding(mk_prtb("p1", "b1", "p1", "readonly", "user1"));

    test.sync_project_binding("p1", "b1").await.unwrap();

    let mut placed = test
        .store
        .all::<RoleBinding>()
        .into_iter()
        .map(|rb| (rb.namespace().unwrap(), rb.name_unchecked()))
        .collect::<Vec<_>>();
    placed.sort();
    assert_eq!(
        placed,
        vec![
            ("ns1".to_string(), "readonly-user1-uid-b1".to_string()),
            ("ns2".to_string(), "readonly-user1-uid-b1".to_string()),
        ]
    );
    assert!(test.store.fetch::<Role>(Some("other"), "readonly").is_none());
    assert!(test.store.fetch::<Role>(Some("unlabeled"), "readonly").is_none());
}

#[tokio::test]
async fn builtin_roles_are_bound_but_never_written() {
    let test = TestConfig::new();
    test.template(mk_builtin("view"));
    test.template(mk_template(
        "readonly",
        vec![mk_rule(&["get"], &["apps"], &["deployments"], &[])],
        &["view"],
    ));
    test.namespace("ns1", Some("p1"));
    test.project_binding(mk_prtb("p1", "b1", "p1", "view", "user1"));
    test.project_binding(mk_prtb("p1", "b2", "p1", "readonly", "user2"));

    test.sync_project_binding("p1", "b1").await.unwrap();
    test.sync_project_binding("p1", "b2").await.unwrap();

    assert!(test.store.fetch::<Role>(Some("ns1"), "view").is_none());
    assert!(test.store.fetch::<ClusterRole>(None, "view").is_none());
    for write in test.store.writes() {
        if let Write::Create((kind, _, name)) | Write::Update((kind, _, name)) = write {
            assert!(
                !(name == "view" && (kind == "Role" || kind == "ClusterRole")),
                "builtin role must not be written"
            );
        }
    }

    let rb = test
        .store
        .fetch::<RoleBinding>(Some("ns1"), "view-user1-uid-b1")
        .expect("builtin role must be bound");
    assert_eq!(rb.role_ref, role_ref("ClusterRole", "view"));

    // A template that references a builtin binds both its own role and the builtin.
    let own = test
        .store
        .fetch::<RoleBinding>(Some("ns1"), "readonly-user2-uid-b2")
        .unwrap();
    assert_eq!(own.role_ref, role_ref("Role", "readonly"));
    let builtin = test
        .store
        .fetch::<RoleBinding>(Some("ns1"), "view-user2-uid-b2")
        .unwrap();
    assert_eq!(builtin.role_ref, role_ref("ClusterRole", "view"));
}

#[tokio::test]
async fn cluster_binding_uses_cluster_roles() {
    let test = TestConfig::new();
    test.template(mk_template(
        "nodes-view",
        vec![mk_rule(&["get", "list"], &[""], &["nodes"], &[])],
        &[],
    ));
    test.cluster_binding(mk_crtb("local", "c1", "nodes-view", "user1"));

    test.reconciler
        .sync_cluster_binding("local", "c1")
        .await
        .unwrap();

    let role = test
        .store
        .fetch::<ClusterRole>(None, "nodes-view")
        .expect("cluster role must exist");
    assert_eq!(
        role.rules,
        Some(vec![mk_rule(&["get", "list"], &[""], &["nodes"], &[])])
    );
    let crb = test
        .store
        .fetch::<ClusterRoleBinding>(None, "nodes-view-user1-uid-c1")
        .expect("cluster role binding must exist");
    assert_eq!(crb.role_ref, role_ref("ClusterRole", "nodes-view"));
    assert_eq!(crb.labels()[OWNER_LABEL], "uid-c1");
    assert!(test.store.all::<RoleBinding>().is_empty());
}

#[tokio::test]
async fn empty_project_is_a_no_op() {
    let test = TestConfig::new();
    seed_readonly(&test);
    test.project_binding(mk_prtb("p1", "b1", "p1", "readonly", "user1"));

    test.sync_project_binding("p1", "b1").await.unwrap();

    // Only the finalizer is written.
    assert_eq!(
        test.store.writes(),
        vec![Write::Update(write_key::<ProjectRoleTemplateBinding>(
            Some("p1"),
            "b1"
        ))]
    );
}

#[tokio::test]
async fn misconfigured_binding_is_not_retried() {
    let test = TestConfig::new();
    seed_readonly(&test);
    test.namespace("ns1", Some("p1"));
    test.project_binding(mk_prtb("p1", "no-template", "p1", "", "user1"));
    test.project_binding(mk_prtb("p1", "no-subject", "p1", "readonly", ""));

    for name in ["no-template", "no-subject"] {
        let error = test.sync_project_binding("p1", name).await.unwrap_err();
        assert!(matches!(error, Error::Configuration(_)), "{error}");
        assert!(!error.is_retryable());
    }

    assert!(test.store.all::<Role>().is_empty());
    assert!(test.store.all::<RoleBinding>().is_empty());
}

#[tokio::test]
async fn unresolvable_template_fails_without_grants() {
    let test = TestConfig::new();
    test.namespace("ns1", Some("p1"));
    test.project_binding(mk_prtb("p1", "b1", "p1", "missing", "user1"));

    let error = test.sync_project_binding("p1", "b1").await.unwrap_err();
    assert!(error.is_not_found(), "{error}");
    assert!(error.is_retryable());
    assert!(test.store.all::<RoleBinding>().is_empty());
}

#[tokio::test]
async fn missing_psp_template_is_skipped() {
    let test = TestConfig::new();
    test.template(mk_template(
        "restricted",
        vec![
            mk_rule(&["use"], &["extensions"], &["PodSecurityPolicies"], &["absent", "psp-1"]),
            mk_rule(&["get"], &[""], &["pods"], &[]),
        ],
        &[],
    ));
    test.store
        .seed(mk_psp_template("psp-1", json!({ "privileged": false })));
    test.namespace("ns1", Some("p1"));
    test.project_binding(mk_prtb("p1", "b1", "p1", "restricted", "user1"));

    test.sync_project_binding("p1", "b1").await.unwrap();

    assert!(test.store.fetch::<PodSecurityPolicy>(None, "absent").is_none());
    assert!(test.store.fetch::<PodSecurityPolicy>(None, "psp-1").is_some());
    assert!(test
        .store
        .fetch::<RoleBinding>(Some("ns1"), "restricted-user1-uid-b1")
        .is_some());
}

#[tokio::test]
async fn changed_psp_template_updates_policy() {
    let test = TestConfig::new();
    seed_readonly(&test);
    test.namespace("ns1", Some("p1"));
    test.project_binding(mk_prtb("p1", "b1", "p1", "readonly", "user1"));
    test.sync_project_binding("p1", "b1").await.unwrap();

    test.store
        .seed(mk_psp_template("psp-1", json!({ "privileged": true })));
    test.store.clear_writes();
    test.sync_project_binding("p1", "b1").await.unwrap();

    assert_eq!(
        test.store.writes(),
        vec![Write::Update(write_key::<PodSecurityPolicy>(None, "psp-1"))]
    );
    let psp = test.store.fetch::<PodSecurityPolicy>(None, "psp-1").unwrap();
    assert_eq!(psp.spec.fields["privileged"], json!(true));
}

#[tokio::test]
async fn partial_fan_out_failure_attempts_every_namespace() {
    let test = TestConfig::new();
    seed_readonly(&test);
    test.namespace("ns1", Some("p1"));
    test.namespace("ns2", Some("p1"));
    test.project_binding(mk_prtb("p1", "b1", "p1", "readonly", "user1"));
    test.store.fail_creates_in("ns1");

    let error = test.sync_project_binding("p1", "b1").await.unwrap_err();
    assert!(error.is_retryable(), "{error}");

    assert!(test.store.fetch::<Role>(Some("ns1"), "readonly").is_none());
    assert!(test.store.fetch::<Role>(Some("ns2"), "readonly").is_some());
    assert!(test
        .store
        .fetch::<RoleBinding>(Some("ns2"), "readonly-user1-uid-b1")
        .is_some());
    assert!(test.store.fetch::<PodSecurityPolicy>(None, "psp-1").is_some());
}

#[tokio::test]
async fn namespace_leaving_project_loses_grants() {
    let test = TestConfig::new();
    seed_readonly(&test);
    test.namespace("ns1", Some("p1"));
    test.namespace("ns2", Some("p1"));
    test.project_binding(mk_prtb("p1", "b1", "p1", "readonly", "user1"));
    test.sync_project_binding("p1", "b1").await.unwrap();

    test.namespace("ns2", Some("p2"));
    test.store.clear_writes();
    test.sync_project_binding("p1", "b1").await.unwrap();

    assert_eq!(
        test.store.writes(),
        vec![Write::Delete(write_key::<RoleBinding>(
            Some("ns2"),
            "readonly-user1-uid-b1"
        ))]
    );
    assert!(test
        .store
        .fetch::<RoleBinding>(Some("ns1"), "readonly-user1-uid-b1")
        .is_some());
}

#[tokio::test]
async fn bindings_for_the_same_grant_do_not_collide() {
    let test = TestConfig::new();
    seed_readonly(&test);
    test.namespace("ns1", Some("p1"));
    test.project_binding(mk_prtb("p1", "b1", "p1", "readonly", "user1"));
    test.project_binding(mk_prtb("p1", "b2", "p1", "readonly", "user1"));

    test.sync_project_binding("p1", "b1").await.unwrap();
    test.sync_project_binding("p1", "b2").await.unwrap();

    let owners = test
        .store
        .all::<RoleBinding>()
        .into_iter()
        .map(|rb| rb.labels()[OWNER_LABEL].clone())
        .collect::<Vec<_>>();
    assert_eq!(owners, vec!["uid-b1".to_string(), "uid-b2".to_string()]);
}

#[tokio::test]
async fn drifted_subjects_are_restored() {
    let test = TestConfig::new();
    seed_readonly(&test);
    test.namespace("ns1", Some("p1"));
    let binding = test.project_binding(mk_prtb("p1", "b1", "p1", "readonly", "user1"));
    test.sync_project_binding("p1", "b1").await.unwrap();

    // The subject's kind is not part of the object name, so the object is updated in place.
    let mut binding = test
        .store
        .fetch::<ProjectRoleTemplateBinding>(Some("p1"), &binding.name_unchecked())
        .unwrap();
    binding.spec.subject.kind = "Group".to_string();
    test.project_binding(binding);
    test.store.clear_writes();
    test.sync_project_binding("p1", "b1").await.unwrap();

    let name = "readonly-user1-uid-b1";
    assert_eq!(
        test.store.writes(),
        vec![Write::Update(write_key::<RoleBinding>(Some("ns1"), name))]
    );
    let rb = test.store.fetch::<RoleBinding>(Some("ns1"), name).unwrap();
    let kinds = rb
        .subjects
        .iter()
        .flatten()
        .map(|s| s.kind.as_str())
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec!["Group"]);

    // Edits made by hand are reverted.
    let mut edited = rb;
    edited.subjects = Some(vec![mk_user("intruder")]);
    test.store.seed(edited);
    test.sync_project_binding("p1", "b1").await.unwrap();
    let rb = test.store.fetch::<RoleBinding>(Some("ns1"), name).unwrap();
    assert_eq!(rb.subjects.unwrap()[0].name, "user1");
}

#[tokio::test]
async fn changed_role_ref_replaces_grant() {
    let test = TestConfig::new();
    seed_readonly(&test);
    test.namespace("ns1", Some("p1"));
    test.project_binding(mk_prtb("p1", "b1", "p1", "readonly", "user1"));
    test.sync_project_binding("p1", "b1").await.unwrap();

    let name = "readonly-user1-uid-b1";
    let mut edited = test.store.fetch::<RoleBinding>(Some("ns1"), name).unwrap();
    edited.role_ref = role_ref("ClusterRole", "cluster-admin");
    test.store.seed(edited);
    test.store.clear_writes();
    test.sync_project_binding("p1", "b1").await.unwrap();

    assert_eq!(
        test.store.writes(),
        vec![
            Write::Delete(write_key::<RoleBinding>(Some("ns1"), name)),
            Write::Create(write_key::<RoleBinding>(Some("ns1"), name)),
        ]
    );
    let rb = test.store.fetch::<RoleBinding>(Some("ns1"), name).unwrap();
    assert_eq!(rb.role_ref, role_ref("Role", "readonly"));
    assert_eq!(rb.labels()[OWNER_LABEL], "uid-b1");
}
