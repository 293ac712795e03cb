//! Integration tests for the GitHub backend against a mock REST API.

use std::sync::Arc;

use gitprovider::pagination::PageOptions;
use gitprovider::permission::PermissionLevel;
use gitprovider::provider::{create_provider_with_transport, GitProvider, ProviderKind};
use gitprovider::resource::{RepositoryRef, RepositorySpec, TeamAccessSpec, Visibility};
use gitprovider::transport::{HttpTransport, RetryConfig};
use gitprovider::{CallContext, ErrorKind};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer, pages: PageOptions) -> Box<dyn GitProvider> {
    let transport = HttpTransport::builder(server.uri())
        .retry(RetryConfig::disabled())
        .build()
        .unwrap();
    create_provider_with_transport(ProviderKind::GitHub, Arc::new(transport), pages)
}

fn repository_json(description: &str) -> Value {
    json!({
        "id": 99,
        "name": "api",
        "description": description,
        "private": true,
        "visibility": "private",
        "default_branch": "main",
        "owner": {"login": "acme"},
        "clone_url": "https://github.com/acme/api.git",
        "ssh_url": "git@github.com:acme/api.git"
    })
}

mod pagination {
    use super::*;

    #[tokio::test]
    async fn follows_link_header_until_no_next() {
        let server = MockServer::start().await;
        let next = format!("<{}/user/orgs?page=2&per_page=2>; rel=\"next\"", server.uri());
        Mock::given(method("GET"))
            .and(path("/user/orgs"))
            .and(query_param("page", "1"))
            .and(query_param("per_page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", next.as_str())
                    .set_body_json(json!([{"login": "acme", "id": 1}, {"login": "globex", "id": 2}])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/orgs"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"login": "initech", "id": 3}])))
            .expect(1)
            .mount(&server)
            .await;

        let pages = PageOptions {
            limit: Some(2),
            ..PageOptions::default()
        };
        let orgs = provider(&server, pages)
            .list_organizations(&CallContext::new())
            .await
            .unwrap();
        let keys: Vec<_> = orgs.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["acme", "globex", "initech"]);
    }

    #[tokio::test]
    async fn page_cap_stops_runaway_listing() {
        let server = MockServer::start().await;
        let next = format!("<{}/user/orgs?page=2>; rel=\"next\"", server.uri());
        Mock::given(method("GET"))
            .and(path("/user/orgs"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", next.as_str())
                    .set_body_json(json!([{"login": "acme"}])),
            )
            .mount(&server)
            .await;

        let pages = PageOptions {
            max_pages: Some(1),
            ..PageOptions::default()
        };
        let err = provider(&server, pages)
            .list_organizations(&CallContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TooManyPages);
    }
}

mod repository {
    use super::*;

    #[tokio::test]
    async fn patch_sends_only_changed_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(repository_json("old")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/repos/acme/api"))
            .and(body_json(json!({"description": "new"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(repository_json("new")))
            .expect(1)
            .mount(&server)
            .await;

        let spec = RepositorySpec::new("api")
            .with_description("new")
            .with_visibility(Visibility::Private)
            .with_default_branch("main");
        let changed = provider(&server, PageOptions::default())
            .reconcile_repository(&CallContext::new(), "acme", spec)
            .await
            .unwrap();
        assert!(changed);
    }

    #[tokio::test]
    async fn empty_description_sends_no_patch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(repository_json("")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let changed = provider(&server, PageOptions::default())
            .reconcile_repository(&CallContext::new(), "acme", RepositorySpec::new("api").with_description(""))
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn duplicate_name_on_create_is_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/orgs/acme/repos"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "Repository creation failed.",
                "errors": [{"resource": "Repository", "field": "name", "message": "name already exists on this account"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = provider(&server, PageOptions::default())
            .reconcile_repository(&CallContext::new(), "acme", RepositorySpec::new("api"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn other_unprocessable_entity_is_validation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/orgs/acme/repos"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "Validation Failed",
                "errors": [{"message": "visibility can't be internal for this organization"}]
            })))
            .mount(&server)
            .await;

        let spec = RepositorySpec::new("api").with_visibility(Visibility::Internal);
        let err = provider(&server, PageOptions::default())
            .reconcile_repository(&CallContext::new(), "acme", spec)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn get_prefers_https_clone_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(repository_json("API")))
            .mount(&server)
            .await;

        let repo = provider(&server, PageOptions::default())
            .get_repository(&CallContext::new(), &RepositoryRef::new("acme", "api"))
            .await
            .unwrap();
        assert_eq!(repo.clone_urls[0], "https://github.com/acme/api.git");
        assert_eq!(repo.default_branch.as_deref(), Some("main"));
    }
}

mod team_access {
    use super::*;

    #[tokio::test]
    async fn effective_level_includes_organization_base() {
        let server = MockServer::start().await;
        let mut team_view = repository_json("API");
        team_view["permissions"] = json!({
            "admin": false, "maintain": false, "push": false, "triage": false, "pull": true
        });
        Mock::given(method("GET"))
            .and(path("/orgs/acme/teams/devs/repos/acme/api"))
            .and(header("Accept", "application/vnd.github.v3.repository+json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(team_view))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "login": "acme", "default_repository_permission": "write"
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let changed = provider(&server, PageOptions::default())
            .reconcile_team_access(
                &CallContext::new(),
                &RepositoryRef::new("acme", "api"),
                TeamAccessSpec::new("devs", PermissionLevel::Write),
            )
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn higher_organization_base_settles_without_writes() {
        let server = MockServer::start().await;
        let mut team_view = repository_json("API");
        team_view["permissions"] = json!({
            "admin": false, "maintain": false, "push": false, "triage": false, "pull": true
        });
        Mock::given(method("GET"))
            .and(path("/orgs/acme/teams/devs/repos/acme/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(team_view))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "login": "acme", "default_repository_permission": "admin"
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let provider = provider(&server, PageOptions::default());
        for _ in 0..2 {
            let changed = provider
                .reconcile_team_access(
                    &CallContext::new(),
                    &RepositoryRef::new("acme", "api"),
                    TeamAccessSpec::new("devs", PermissionLevel::Read),
                )
                .await
                .unwrap();
            assert!(!changed);
        }
    }

    #[tokio::test]
    async fn missing_grant_is_created() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/teams/devs/repos/acme/api"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/orgs/acme/teams/devs/repos/acme/api"))
            .and(body_json(json!({"permission": "maintain"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let changed = provider(&server, PageOptions::default())
            .reconcile_team_access(
                &CallContext::new(),
                &RepositoryRef::new("acme", "api"),
                TeamAccessSpec::new("devs", PermissionLevel::Maintain),
            )
            .await
            .unwrap();
        assert!(changed);
    }
}

mod organization {
    use super::*;

    #[tokio::test]
    async fn children_are_unsupported() {
        let server = MockServer::start().await;
        let err = provider(&server, PageOptions::default())
            .organization_children(&CallContext::new(), "acme")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoProviderSupport);
    }
}
