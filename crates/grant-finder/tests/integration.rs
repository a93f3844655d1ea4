use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn gf_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("gf");
    path
}

/// Ten grants with fixed far-future or absent dates so results do not
/// depend on the day the tests run.
fn fixture_grants() -> Value {
    json!([
        {"id": "g01", "title": "Rural Water Infrastructure", "agency": "USDA",
         "description": "Drinking water systems for rural communities",
         "awardCeiling": 100000, "closeDate": "2099-03-01", "postDate": "2024-01-10",
         "fundingType": "grant", "costSharing": true,
         "categories": ["Environment"], "eligibleApplicants": ["nonprofits"]},
        {"id": "g02", "title": "STEM Education Fellowships", "agency": "NSF",
         "awardCeiling": 50000, "closeDate": "2099-01-15", "postDate": "2024-02-01",
         "fundingType": "grant", "costSharing": false,
         "categories": ["Education"], "eligibleApplicants": ["universities"]},
        {"id": "g03", "title": "Community Health Workers", "agency": "NIH",
         "awardCeiling": 250000, "closeDate": "2099-06-30",
         "fundingType": "cooperative_agreement",
         "categories": ["Health"], "eligibleApplicants": ["nonprofits", "universities"]},
        {"id": "g04", "title": "Open Arts Program", "agency": "NEA",
         "categories": ["Arts"], "eligibleApplicants": ["individuals"]},
        {"id": "g05", "title": "Grid Modernization Pilots", "agency": "DOE",
         "awardCeiling": 1500000, "closeDate": "2099-02-01", "postDate": "2024-03-15",
         "fundingType": "grant", "costSharing": true,
         "categories": ["Energy", "Environment"], "eligibleApplicants": ["utilities"]},
        {"id": "g06", "title": "Watershed Restoration", "agency": "USDA",
         "description": "Stream and wetland restoration",
         "awardCeiling": 75000, "postDate": "2024-01-20",
         "fundingType": "grant",
         "categories": ["Environment"], "eligibleApplicants": ["nonprofits"]},
        {"id": "g07", "title": "Early Career Research", "agency": "NSF",
         "awardCeiling": 100001, "closeDate": "2099-04-01",
         "fundingType": "grant",
         "categories": ["Education", "Research"], "eligibleApplicants": ["universities"]},
        {"id": "g08", "title": "Rural Clinic Support", "agency": "NIH",
         "awardCeiling": 49999, "closeDate": "2099-05-01",
         "fundingType": "grant", "costSharing": false,
         "categories": ["Health"], "eligibleApplicants": ["nonprofits"]},
        {"id": "g09", "title": "Museum Digitization", "agency": "NEA",
         "awardCeiling": 60000, "closeDate": "2099-01-01",
         "fundingType": "grant",
         "categories": ["Arts"], "eligibleApplicants": ["nonprofits"]},
        {"id": "g10", "title": "Energy Efficiency Audits", "agency": "DOE",
         "closeDate": "2099-07-01",
         "fundingType": "grant",
         "categories": ["Energy"], "eligibleApplicants": ["utilities"]}
    ])
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    fs::write(
        data_dir.join("grants.json"),
        serde_json::to_string_pretty(&fixture_grants()).unwrap(),
    )
    .unwrap();
    fs::write(
        data_dir.join("preferences.json"),
        json!([
            {"userId": "u1", "preferredCategories": ["Environment"],
             "preferredAgencies": ["USDA"], "preferredFundingBand": [50000, 150000]}
        ])
        .to_string(),
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/grants.sqlite"

[search]
page_size = 4
relevance_batch_size = 100

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );

    let config_path = config_dir.join("gf.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_gf(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = gf_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run gf binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn setup_with_data() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let data = tmp.path().join("data");
    let (_, stderr, ok) = run_gf(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    let (_, stderr, ok) = run_gf(
        &config_path,
        &["import", "grants", data.join("grants.json").to_str().unwrap()],
    );
    assert!(ok, "import grants failed: {}", stderr);
    let (_, stderr, ok) = run_gf(
        &config_path,
        &["import", "preferences", data.join("preferences.json").to_str().unwrap()],
    );
    assert!(ok, "import preferences failed: {}", stderr);
    (tmp, config_path)
}

fn search_json(config_path: &Path, args: &[&str]) -> Value {
    let mut full = vec!["search", "--json"];
    full.extend_from_slice(args);
    let (stdout, stderr, success) = run_gf(config_path, &full);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    serde_json::from_str(&stdout).unwrap()
}

fn ids(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_gf(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/grants.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_gf(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_gf(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_reports_counts() {
    let (tmp, config_path) = setup_test_env();
    run_gf(&config_path, &["init"]);

    let file = tmp.path().join("data/grants.json");
    let (stdout, stderr, success) =
        run_gf(&config_path, &["import", "grants", file.to_str().unwrap()]);
    assert!(success, "import failed: {}", stderr);
    assert!(stdout.contains("Imported 10 grants."));
}

#[test]
fn test_reimport_does_not_duplicate() {
    let (tmp, config_path) = setup_with_data();
    let file = tmp.path().join("data/grants.json");
    run_gf(&config_path, &["import", "grants", file.to_str().unwrap()]);

    let page = search_json(&config_path, &[]);
    assert_eq!(page["totalCount"], 10);
}

#[test]
fn test_import_rejects_malformed_file() {
    let (tmp, config_path) = setup_test_env();
    run_gf(&config_path, &["init"]);
    let bad = tmp.path().join("data/bad.json");
    fs::write(&bad, "{\"not\": \"an array\"}").unwrap();

    let (_, stderr, success) = run_gf(&config_path, &["import", "grants", bad.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("JSON array"));
}

#[test]
fn test_search_default_pages_by_deadline() {
    let (_tmp, config_path) = setup_with_data();

    let page = search_json(&config_path, &[]);
    assert_eq!(page["totalCount"], 10);
    assert_eq!(page["totalPages"], 3);
    assert_eq!(page["pageSize"], 4);
    assert_eq!(page["hasMore"], true);
    assert_eq!(ids(&page), vec!["g09", "g02", "g05", "g01"]);

    let last = search_json(&config_path, &["--page", "3"]);
    // g04 and g06 have no close date and sort last
    assert_eq!(ids(&last), vec!["g04", "g06"]);
    assert_eq!(last["hasMore"], false);
}

#[test]
fn test_search_funding_band_inclusive() {
    let (_tmp, config_path) = setup_with_data();

    let page = search_json(
        &config_path,
        &[
            "--funding-min", "50000",
            "--funding-max", "100000",
            "--exclude-funding-null",
            "--sort", "funding-descending",
        ],
    );
    assert_eq!(page["totalCount"], 4);
    assert_eq!(ids(&page), vec!["g01", "g06", "g09", "g02"]);
}

#[test]
fn test_search_only_no_funding() {
    let (_tmp, config_path) = setup_with_data();

    let page = search_json(
        &config_path,
        &["--only-no-funding", "--funding-min", "1000000"],
    );
    assert_eq!(page["totalCount"], 2);
    for item in page["items"].as_array().unwrap() {
        assert!(item.get("awardCeiling").map_or(true, Value::is_null));
    }
}

#[test]
fn test_search_text_and_sets() {
    let (_tmp, config_path) = setup_with_data();

    let page = search_json(&config_path, &["rural"]);
    assert_eq!(ids(&page), vec!["g01", "g08"]);

    let page = search_json(&config_path, &["--category", "Energy,Arts", "--sort", "title-ascending"]);
    assert_eq!(ids(&page), vec!["g10", "g05", "g09", "g04"]);

    let page = search_json(&config_path, &["--agency", "NSF", "--cost-sharing", "not required"]);
    assert_eq!(ids(&page), vec!["g02"]);
}

#[test]
fn test_search_text_output() {
    let (_tmp, config_path) = setup_with_data();

    let (stdout, stderr, success) = run_gf(&config_path, &["search", "watershed"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("1 grants (page 1 of 1)"));
    assert!(stdout.contains("Watershed Restoration"));
    assert!(stdout.contains("ceiling: $75,000"));
    assert!(stdout.contains("closes: open"));
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = setup_with_data();

    let (stdout, _, success) = run_gf(&config_path, &["search", "xyzzy"]);
    assert!(success);
    assert!(stdout.contains("No results."));

    let page = search_json(&config_path, &["xyzzy"]);
    assert_eq!(page["totalCount"], 0);
    assert_eq!(page["totalPages"], 1);
    assert_eq!(page["isEmpty"], true);
}

#[test]
fn test_search_page_past_the_end_reports_total() {
    let (_tmp, config_path) = setup_with_data();

    let (stdout, stderr, success) = run_gf(&config_path, &["search", "--page", "9"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("No results on page 9 of 3 (10 grants)"));
    assert!(stdout.contains("Last page: --page 3"));

    let page = search_json(&config_path, &["--page", "9"]);
    assert_eq!(page["totalCount"], 10);
    assert_eq!(page["totalPages"], 3);
    assert_eq!(page["isEmpty"], true);
}

#[test]
fn test_search_relevance_deterministic() {
    let (_tmp, config_path) = setup_with_data();

    let args = ["--sort", "relevance", "--user", "u1"];
    let first = search_json(&config_path, &args);
    let second = search_json(&config_path, &args);
    assert_eq!(first, second);
    // USDA + Environment + in-band ceiling outranks everything else
    assert_eq!(ids(&first)[0], "g01");
    assert!(first["items"][0]["score"].as_f64().unwrap() > 0.8);
}

#[test]
fn test_search_unknown_sort_errors() {
    let (_tmp, config_path) = setup_with_data();

    let (_, stderr, success) = run_gf(&config_path, &["search", "--sort", "newest"]);
    assert!(!success);
    assert!(stderr.contains("Unsupported filter"));
}

#[test]
fn test_search_page_zero_errors() {
    let (_tmp, config_path) = setup_with_data();

    let (_, stderr, success) = run_gf(&config_path, &["search", "--page", "0"]);
    assert!(!success);
    assert!(stderr.contains("Invalid filter"));
}

#[test]
fn test_search_filter_json_file() {
    let (tmp, config_path) = setup_with_data();
    let filter = tmp.path().join("filter.json");
    fs::write(
        &filter,
        json!({"fundingMin": 50000, "fundingMax": 100000, "includeFundingNull": false,
               "sortBy": "funding-descending", "page": 1})
        .to_string(),
    )
    .unwrap();

    let page = search_json(&config_path, &["--filter-json", filter.to_str().unwrap()]);
    assert_eq!(ids(&page), vec!["g01", "g06", "g09", "g02"]);

    fs::write(&filter, json!({"colour": "red"}).to_string()).unwrap();
    let (_, stderr, success) = run_gf(
        &config_path,
        &["search", "--filter-json", filter.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("colour"));
}

#[test]
fn test_search_explain_prints_plan() {
    let (_tmp, config_path) = setup_with_data();

    let (stdout, stderr, success) = run_gf(
        &config_path,
        &["search", "--explain", "--funding-min", "50000", "--exclude-funding-null"],
    );
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("where: award_ceiling >= 50000"));
    assert!(stdout.contains("order: close_date ASC NULLS LAST, id ASC NULLS LAST"));
}

#[test]
fn test_stats_json() {
    let (_tmp, config_path) = setup_with_data();

    let (stdout, stderr, success) = run_gf(&config_path, &["stats", "--json"]);
    assert!(success, "stats failed: {}", stderr);
    let snapshot: Value = serde_json::from_str(&stdout).unwrap();

    assert_eq!(snapshot["total"], 10);

    let nulls = snapshot["nullShares"].as_array().unwrap();
    let close = nulls.iter().find(|m| m["field"] == "close_date").unwrap();
    assert_eq!(close["ok"]["nullCount"], 2);
    assert_eq!(close["ok"]["percentage"], 20.0);

    let top = snapshot["topValues"].as_array().unwrap();
    let agency = top.iter().find(|m| m["field"] == "agency").unwrap();
    let first = &agency["ok"][0];
    // USDA, NSF, NIH, NEA, DOE each appear twice; ties keep first-seen order
    assert_eq!(first["name"], "USDA");
    assert_eq!(first["count"], 2);

    assert_eq!(snapshot["summary"]["ok"]["min"], 49999);
    assert_eq!(snapshot["summary"]["ok"]["max"], 1500000);
}

#[test]
fn test_stats_text() {
    let (_tmp, config_path) = setup_with_data();

    let (stdout, stderr, success) = run_gf(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Grants:      10"));
    assert!(stdout.contains("Top agency:"));
    assert!(stdout.contains("Histogram (award_ceiling):"));
}

#[test]
fn test_missing_config_errors() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_gf(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
