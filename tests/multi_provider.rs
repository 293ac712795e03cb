//! Tests for provider selection and provider-neutral behavior.
//!
//! The same calls go through both backends; only the wire format differs.

use std::sync::Arc;

use gitprovider::config::{Config, ProviderConfig, RetrySettings};
use gitprovider::pagination::PageOptions;
use gitprovider::provider::{
    create_provider, create_provider_with_transport, valid_provider_names, GitProvider,
    ProviderKind,
};
use gitprovider::resource::RepositoryRef;
use gitprovider::transport::{HttpTransport, RetryConfig};
use gitprovider::{CallContext, ErrorKind};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(provider: &str, base_url: &str) -> Config {
    Config::new(ProviderConfig {
        provider: Some(provider.into()),
        base_url: Some(base_url.into()),
        token: Some("secret".into()),
        retry: Some(RetrySettings {
            max: Some(0),
            ..Default::default()
        }),
        ..Default::default()
    })
}

mod factory {
    use super::*;

    #[test]
    fn every_valid_name_builds_a_provider() {
        for name in valid_provider_names() {
            let provider = create_provider(&config(name, "https://git.example.com")).unwrap();
            let kind = ProviderKind::parse(name).unwrap();
            assert_eq!(provider.name(), kind.name());
        }
    }

    #[test]
    fn unknown_provider_lists_alternatives() {
        let Err(err) = create_provider(&config("gitea", "https://git.example.com")) else {
            panic!("unknown provider name was accepted");
        };
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("github, stash"));
    }

    #[test]
    fn stash_requires_base_url() {
        let config = Config::new(ProviderConfig {
            provider: Some("stash".into()),
            ..Default::default()
        });
        let Err(err) = create_provider(&config) else {
            panic!("stash without base_url was accepted");
        };
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn providers_use_their_own_permission_tables() {
        use gitprovider::permission::{PermissionLevel, PermissionScope};

        let github = create_provider(&config("github", "https://api.github.com")).unwrap();
        let stash = create_provider(&config("stash", "https://stash.example.com")).unwrap();
        assert_eq!(
            github
                .permission_mapper()
                .to_provider_level(PermissionScope::Repository, PermissionLevel::Write)
                .unwrap(),
            "push"
        );
        assert_eq!(
            stash
                .permission_mapper()
                .to_provider_level(PermissionScope::Repository, PermissionLevel::Write)
                .unwrap(),
            "REPO_WRITE"
        );
    }
}

mod wire {
    use super::*;

    #[tokio::test]
    async fn github_sends_bearer_token_and_api_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme"))
            .and(header("Authorization", "Bearer secret"))
            .and(header("X-GitHub-Api-Version", "2022-11-28"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"login": "acme", "name": "Acme"})))
            .expect(1)
            .mount(&server)
            .await;

        let provider = create_provider(&config("github", &server.uri())).unwrap();
        let org = provider
            .get_organization(&CallContext::new(), "acme")
            .await
            .unwrap();
        assert_eq!(org.key, "acme");
        assert_eq!(org.name, "Acme");
    }

    #[tokio::test]
    async fn stash_sends_xsrf_bypass_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/1.0/projects/PRJ"))
            .and(header("X-Atlassian-Token", "no-check"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"key": "PRJ", "name": "Project"})))
            .expect(1)
            .mount(&server)
            .await;

        let provider = create_provider(&config("stash", &server.uri())).unwrap();
        let org = provider
            .get_organization(&CallContext::new(), "PRJ")
            .await
            .unwrap();
        assert_eq!(org.key, "PRJ");
    }

    #[tokio::test]
    async fn unauthorized_is_auth_failed_on_both_backends() {
        for kind in ProviderKind::all() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
                .mount(&server)
                .await;

            let transport = HttpTransport::builder(server.uri())
                .retry(RetryConfig::disabled())
                .build()
                .unwrap();
            let provider: Box<dyn GitProvider> =
                create_provider_with_transport(*kind, Arc::new(transport), PageOptions::default());
            let err = provider
                .get_repository(&CallContext::new(), &RepositoryRef::new("PRJ", "svc"))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AuthFailed, "{kind}");
        }
    }
}
