use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const CREDENTIAL_VARS: [&str; 5] = [
    "AZURE_OPENAI_API_KEY",
    "AZURE_OPENAI_API_BASE",
    "AZURE_OPENAI_API_VERSION",
    "AZURE_OPENAI_DEPLOYMENT_NAME",
    "TAVILY_API_KEY",
];

/// One reply that satisfies every stage: numbered lines parse as research
/// questions and the `Campaign` block parses as a valid campaign.
const CANNED_REPLY: &str = "Campaign 1: Trail Ready\n\
1. Campaign Name: Trail Ready\n\
2. Core Message: Run further with confidence\n\
3. Visual Theme Description: Misty forest trails at dawn";

fn adsmith_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("adsmith");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/adsmith.sqlite"

[pipeline]
num_campaigns = 3
output_dir = "{root}/Outputs"

[search]
enabled = false

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("adsmith.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

/// Run the binary from the temp root with credentials taken only from `env`.
fn run_adsmith(
    config_path: &Path,
    env: &[(&str, &str)],
    args: &[&str],
) -> (String, String, bool) {
    let binary = adsmith_binary();
    let root = config_path.parent().unwrap().parent().unwrap();

    let mut cmd = Command::new(&binary);
    cmd.current_dir(root)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args);
    for var in CREDENTIAL_VARS {
        cmd.env_remove(var);
    }
    cmd.env_remove("STABILITY_API_KEY");
    cmd.envs(env.iter().copied());

    let output = cmd
        .output()
        .unwrap_or_else(|e| panic!("Failed to run adsmith binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn credentials(api_base: &str) -> Vec<(&'static str, String)> {
    vec![
        ("AZURE_OPENAI_API_KEY", "test-key".to_string()),
        ("AZURE_OPENAI_API_BASE", api_base.to_string()),
        ("AZURE_OPENAI_API_VERSION", "2024-02-01".to_string()),
        ("AZURE_OPENAI_DEPLOYMENT_NAME", "gpt-test".to_string()),
        ("TAVILY_API_KEY", "tvly-test".to_string()),
    ]
}

fn as_pairs<'a>(env: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
    env.iter().map(|(k, v)| (*k, v.as_str())).collect()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_adsmith(&config_path, &[], &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/adsmith.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_adsmith(&config_path, &[], &["init"]);
    assert!(first);
    let (_, stderr, second) = run_adsmith(&config_path, &[], &["init"]);
    assert!(second, "second init failed: {}", stderr);
}

#[test]
fn test_history_empty_without_credentials() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_adsmith(&config_path, &[], &["history"]);
    assert!(success, "history failed: {}", stderr);
    assert!(stdout.contains("No runs recorded."));
}

#[test]
fn test_history_rejects_out_of_range_limit() {
    let (_tmp, config_path) = setup_test_env();

    for limit in ["--limit=0", "--limit=-1", "--limit=201"] {
        let (_, stderr, success) = run_adsmith(&config_path, &[], &["history", limit]);
        assert!(!success, "{} was accepted", limit);
        assert!(stderr.contains("limit must be between 1 and 200"), "{}", stderr);
    }

    let (_, stderr, success) = run_adsmith(&config_path, &[], &["history", "--limit=200"]);
    assert!(success, "history failed: {}", stderr);
}

#[test]
fn test_run_reports_every_missing_variable() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_adsmith(
        &config_path,
        &[("AZURE_OPENAI_API_KEY", "set")],
        &["run", "Acme"],
    );
    assert!(!success);
    assert!(stderr.contains("Missing required environment variables"));
    for var in &CREDENTIAL_VARS[1..] {
        assert!(stderr.contains(var), "{} not reported in: {}", var, stderr);
    }
    assert!(!stderr.contains("AZURE_OPENAI_API_KEY,"));
}

#[test]
fn test_show_missing_run() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_adsmith(&config_path, &[], &["show", "no-such-run"]);
    assert!(!success);
    assert!(stderr.contains("run not found"));
}

#[test]
fn test_cache_stats_and_clear_on_empty_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_adsmith(&config_path, &[], &["cache", "stats"]);
    assert!(success);
    assert!(stdout.contains("durable entries: 0"));

    let (stdout, _, success) = run_adsmith(&config_path, &[], &["cache", "clear"]);
    assert!(success);
    assert!(stdout.contains("Cleared 0 cache entries."));
}

#[test]
fn test_run_end_to_end_and_reuse_cache() {
    let (tmp, config_path) = setup_test_env();

    let mut server = mockito::Server::new();
    // research 3 + marketing 4 + ad generation 3 for the single campaign
    let mock = server
        .mock(
            "POST",
            mockito::Matcher::Regex(r"^/openai/deployments/gpt-test/chat/completions".into()),
        )
        .match_header("api-key", "test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": CANNED_REPLY } }]
            })
            .to_string(),
        )
        .expect(10)
        .create();

    let env = credentials(&server.url());
    let env = as_pairs(&env);

    let (stdout, stderr, success) = run_adsmith(
        &config_path,
        &env,
        &["run", "Acme Running", "--audience", "urban runners"],
    );
    assert!(success, "run failed: {}", stderr);
    assert!(stdout.contains("campaigns: 1"));
    assert!(stdout.contains("1. Trail Ready"));
    assert!(stdout.contains("tagline: Campaign 1: Trail Ready"));

    // A second process answers every call from the durable cache.
    let (_, stderr, success) = run_adsmith(
        &config_path,
        &env,
        &["run", "Acme Running", "--audience", "urban runners"],
    );
    assert!(success, "second run failed: {}", stderr);
    mock.assert();

    let outputs: Vec<_> = fs::read_dir(tmp.path().join("Outputs"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert!(!outputs.is_empty());
    assert!(outputs[0].join("campaign_details.json").exists());

    let (stdout, _, success) = run_adsmith(&config_path, &[], &["history"]);
    assert!(success);
    assert_eq!(stdout.matches("succeeded").count(), 2);

    let run_id = stdout.split_whitespace().next().unwrap().to_string();
    let (stdout, stderr, success) = run_adsmith(&config_path, &[], &["show", &run_id]);
    assert!(success, "show failed: {}", stderr);
    let detail: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(detail["company"], "Acme Running");
    assert_eq!(detail["stages"].as_array().unwrap().len(), 3);
}

#[test]
fn test_run_renders_campaign_images_when_key_is_set() {
    let (tmp, config_path) = setup_test_env();

    let mut server = mockito::Server::new();
    let _chat = server
        .mock(
            "POST",
            mockito::Matcher::Regex(r"^/openai/deployments/gpt-test/chat/completions".into()),
        )
        .with_status(200)
        .with_body(
            serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": CANNED_REPLY } }]
            })
            .to_string(),
        )
        .expect_at_least(1)
        .create();
    let image = server
        .mock(
            "POST",
            "/v1/generation/stable-diffusion-xl-1024-v1-0/text-to-image",
        )
        .match_header("authorization", "Bearer sk-stability")
        .with_status(200)
        // "PNG" in base64
        .with_body(r#"{"artifacts":[{"base64":"UE5H","finishReason":"SUCCESS"}]}"#)
        .expect(1)
        .create();

    let mut config = fs::read_to_string(&config_path).unwrap();
    config.push_str(&format!("\n[images]\napi_host = \"{}\"\n", server.url()));
    fs::write(&config_path, config).unwrap();

    let mut env = credentials(&server.url());
    env.push(("STABILITY_API_KEY", "sk-stability".to_string()));
    let env = as_pairs(&env);

    let (stdout, stderr, success) =
        run_adsmith(&config_path, &env, &["run", "Acme Running", "--json"]);
    assert!(success, "run failed: {}", stderr);
    image.assert();

    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let image_path = outcome["ads"]["campaigns"][0]["image_path"].as_str().unwrap();
    assert!(image_path.starts_with(&tmp.path().join("Outputs").display().to_string()));
    assert_eq!(fs::read(image_path).unwrap(), b"PNG");
}
