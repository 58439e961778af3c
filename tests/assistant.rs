use std::collections::BTreeMap;

use assert_matches::assert_matches;
use serde_json::{Value, json};

use microarray_assistant::assistant::{Assistant, MicroarrayAssistant};
use microarray_assistant::builder::AssemblyOptions;
use microarray_assistant::config::GatewaySettings;
use microarray_assistant::dataset::RawDataset;
use microarray_assistant::domain::{DatasetRequest, SessionState};
use microarray_assistant::engine::FitOptions;
use microarray_assistant::error::AssistantError;
use microarray_assistant::gateway::ChatTransport;
use microarray_assistant::geo::DatasetSource;
use microarray_assistant::normalize::NormalizeOptions;
use microarray_assistant::soft::parse_soft;

const FAMILY: &str = include_str!("fixtures/GSE90001_family.soft");

struct FixtureSource;

impl DatasetSource for FixtureSource {
    fn fetch(&self, request: &DatasetRequest) -> Result<RawDataset, AssistantError> {
        let doc = parse_soft(FAMILY)?;
        RawDataset::from_soft(request.series.clone(), &doc, request.platform.as_ref())
    }
}

struct EchoTransport;

impl ChatTransport for EchoTransport {
    fn post_json(
        &self,
        _url: &str,
        _headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<Value, AssistantError> {
        let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
        let model = body["model"].as_str().unwrap_or_default();
        Ok(json!({ "choices": [{ "message": { "content": format!(" {model}: {prompt} ") } }] }))
    }
}

struct DownTransport;

impl ChatTransport for DownTransport {
    fn post_json(
        &self,
        _url: &str,
        _headers: &BTreeMap<String, String>,
        _body: &Value,
    ) -> Result<Value, AssistantError> {
        Err(AssistantError::GatewayHttp("connection refused".to_string()))
    }
}

fn gateway() -> GatewaySettings {
    GatewaySettings {
        base_url: "https://gateway.test/v1".to_string(),
        model: "test-model".to_string(),
        max_tokens: 1000,
        temperature: 0.1,
        headers: BTreeMap::new(),
    }
}

fn session() -> MicroarrayAssistant<FixtureSource, EchoTransport> {
    MicroarrayAssistant::new(FixtureSource, EchoTransport, gateway())
}

fn request() -> DatasetRequest {
    DatasetRequest::new("GSE90001".parse().unwrap())
}

#[test]
fn end_to_end_pipeline() {
    let mut assistant = session();
    assert_eq!(assistant.state(), SessionState::Empty);

    assistant.load_data(&request()).unwrap();
    assert_eq!(assistant.state(), SessionState::Loaded);

    let matrix = assistant.assemble(&AssemblyOptions::default()).unwrap();
    assert_eq!((matrix.n_obs(), matrix.n_vars()), (4, 3));
    let assembled_x = matrix.x().clone();
    assert_eq!(assistant.state(), SessionState::Assembled);

    assistant.normalize(NormalizeOptions::default()).unwrap();
    let matrix = assistant.matrix().unwrap();
    assert_eq!(matrix.raw().unwrap().x, assembled_x);
    assert_eq!(matrix.x(), &assembled_x.map(f64::ln_1p));
    assert_eq!(assistant.state(), SessionState::Normalized);

    let result = assistant.fit(&FitOptions::default()).unwrap();
    assert!(result.top_table.len() <= 300);
    assert_eq!(result.top_table.len(), 3);
    assert_eq!(assistant.state(), SessionState::Fitted);

    let raw = assistant.raw_dataset().unwrap();
    let genes = raw.platform_table.lookup("ID", "INTERNAL_GENE").unwrap();
    for row in &assistant.top_table().unwrap().rows {
        assert_eq!(genes[row.probe_id.as_str()], row.gene_name);
    }
    assert_eq!(
        assistant.design().unwrap().coefficient_names(),
        ["group[DMSO]", "group[I3C]"]
    );
}

#[test]
fn refit_overwrites_previous_result() {
    let mut assistant = session();
    assistant.load_data(&request()).unwrap();
    assistant.assemble(&AssemblyOptions::default()).unwrap();
    assistant.normalize(NormalizeOptions::default()).unwrap();
    assistant.fit(&FitOptions::default()).unwrap();

    let options = FitOptions {
        formula: "~ group".to_string(),
        coefficient: "group[T.I3C]".to_string(),
        top_n: 2,
    };
    assistant.fit(&options).unwrap();
    assert_eq!(assistant.top_table().unwrap().coefficient, "group[T.I3C]");
    assert_eq!(assistant.top_table().unwrap().len(), 2);
    assert_eq!(assistant.state(), SessionState::Fitted);
}

#[test]
fn operations_out_of_order_fail() {
    let mut assistant = session();

    assert_matches!(
        assistant.assemble(&AssemblyOptions::default()),
        Err(AssistantError::NotLoaded { operation: "assemble", .. })
    );
    assert_matches!(
        assistant.normalize(NormalizeOptions::default()),
        Err(AssistantError::NotLoaded { .. })
    );
    assert_matches!(
        assistant.fit(&FitOptions::default()),
        Err(AssistantError::NotLoaded { .. })
    );
    assert!(assistant.data_overview().is_err());
    assert_eq!(assistant.state(), SessionState::Empty);

    assistant.load_data(&request()).unwrap();
    assert_matches!(
        assistant.load_data(&request()),
        Err(AssistantError::IllegalState { state: SessionState::Loaded, .. })
    );
    assert_matches!(
        assistant.normalize(NormalizeOptions::default()),
        Err(AssistantError::NotLoaded { .. })
    );

    assistant.assemble(&AssemblyOptions::default()).unwrap();
    assert_matches!(
        assistant.fit(&FitOptions::default()),
        Err(AssistantError::IllegalState { operation: "fit", state: SessionState::Assembled })
    );
    assert_matches!(
        assistant.assemble(&AssemblyOptions::default()),
        Err(AssistantError::IllegalState { .. })
    );

    assistant.normalize(NormalizeOptions::default()).unwrap();
    assistant.fit(&FitOptions::default()).unwrap();
    assert_matches!(
        assistant.normalize(NormalizeOptions::default()),
        Err(AssistantError::IllegalState { state: SessionState::Fitted, .. })
    );
}

#[test]
fn failed_operations_leave_state_unchanged() {
    let mut assistant = session();
    assistant.load_data(&request()).unwrap();

    let options = AssemblyOptions {
        group_pattern: "nothing-matches".to_string(),
        ..AssemblyOptions::default()
    };
    assert_matches!(
        assistant.assemble(&options),
        Err(AssistantError::EmptySelection { .. })
    );
    assert_eq!(assistant.state(), SessionState::Loaded);
    assert!(assistant.matrix().is_none());

    assistant.assemble(&AssemblyOptions::default()).unwrap();
    assistant.normalize(NormalizeOptions::default()).unwrap();
    let options = FitOptions {
        coefficient: "group[missing]".to_string(),
        ..FitOptions::default()
    };
    assert_matches!(
        assistant.fit(&options),
        Err(AssistantError::ContrastNotFound { .. })
    );
    assert_eq!(assistant.state(), SessionState::Normalized);
    assert!(assistant.result().is_none());
}

#[test]
fn normalize_may_repeat_before_fit() {
    let mut assistant = session();
    assistant.load_data(&request()).unwrap();
    assistant.assemble(&AssemblyOptions::default()).unwrap();
    assistant.normalize(NormalizeOptions::default()).unwrap();
    let once = assistant.matrix().unwrap().x().clone();
    assistant.normalize(NormalizeOptions::default()).unwrap();
    assert_ne!(assistant.matrix().unwrap().x(), &once);
    assert_eq!(assistant.state(), SessionState::Normalized);
}

#[test]
fn data_overview_lists_samples() {
    let mut assistant = session();
    assistant.load_data(&request()).unwrap();
    assistant.assemble(&AssemblyOptions::default()).unwrap();
    let overview = assistant.data_overview().unwrap();
    assert!(overview.starts_with("ExpressionMatrix with n_obs x n_vars = 4 x 3"));
    assert!(overview.contains("GSM900004\tother\tDMSO"));
}

#[test]
fn questions_work_in_any_state() {
    let assistant = session();
    assert_eq!(
        assistant.answer_question("What is I3C?"),
        "test-model: What is I3C?"
    );
    assert_eq!(assistant.ask("hi").content, "test-model: hi");

    let offline: MicroarrayAssistant<FixtureSource, DownTransport> =
        MicroarrayAssistant::new(FixtureSource, DownTransport, gateway());
    let answer = offline.answer_question("What is I3C?");
    assert!(answer.starts_with("Error: "));
}

#[test]
fn trait_surface_drives_the_session() {
    let mut assistant = session();
    assistant.get_data(request()).unwrap();
    assistant.assemble(&AssemblyOptions::default()).unwrap();
    assistant.normalize_data(NormalizeOptions::default()).unwrap();
    assert_eq!(assistant.state(), SessionState::Normalized);
    assert!(assistant.normalize_summary().is_some());
}
