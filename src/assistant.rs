use std::marker::PhantomData;

use tracing::info;

use crate::builder::{AssemblyOptions, assemble};
use crate::config::GatewaySettings;
use crate::dataset::RawDataset;
use crate::design::DesignMatrix;
use crate::domain::{DatasetRequest, SessionState};
use crate::engine::{DifferentialExpression, FitOptions, fit_differential_expression};
use crate::error::AssistantError;
use crate::gateway::{AskModelRequest, AskModelResponse, ChatTransport, ModelResponse, ask_model};
use crate::geo::DatasetSource;
use crate::matrix::ExpressionMatrix;
use crate::normalize::{NormalizeOptions, NormalizeSummary, normalize};
use crate::top_table::TopTable;

pub trait Assistant {
    type DataRequest;
    type NormalizeOptions;

    fn get_data(&mut self, request: Self::DataRequest) -> Result<(), AssistantError>;

    fn normalize_data(&mut self, options: Self::NormalizeOptions) -> Result<(), AssistantError>;

    fn answer_question(&self, question: &str) -> String;
}

pub struct MicroarrayAssistant<S, T, R = AskModelResponse> {
    source: S,
    transport: T,
    gateway: GatewaySettings,
    state: SessionState,
    raw: Option<RawDataset>,
    matrix: Option<ExpressionMatrix>,
    normalize_summary: Option<NormalizeSummary>,
    result: Option<DifferentialExpression>,
    response: PhantomData<fn() -> R>,
}

impl<S, T, R> MicroarrayAssistant<S, T, R>
where
    S: DatasetSource,
    T: ChatTransport,
    R: ModelResponse,
{
    pub fn new(source: S, transport: T, gateway: GatewaySettings) -> Self {
        Self {
            source,
            transport,
            gateway,
            state: SessionState::Empty,
            raw: None,
            matrix: None,
            normalize_summary: None,
            result: None,
            response: PhantomData,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn raw_dataset(&self) -> Option<&RawDataset> {
        self.raw.as_ref()
    }

    pub fn matrix(&self) -> Option<&ExpressionMatrix> {
        self.matrix.as_ref()
    }

    pub fn normalize_summary(&self) -> Option<&NormalizeSummary> {
        self.normalize_summary.as_ref()
    }

    pub fn result(&self) -> Option<&DifferentialExpression> {
        self.result.as_ref()
    }

    pub fn design(&self) -> Option<&DesignMatrix> {
        self.result.as_ref().map(|result| &result.design)
    }

    pub fn top_table(&self) -> Option<&TopTable> {
        self.result.as_ref().map(|result| &result.top_table)
    }

    pub fn load_data(&mut self, request: &DatasetRequest) -> Result<&RawDataset, AssistantError> {
        if self.state != SessionState::Empty {
            return Err(AssistantError::IllegalState {
                operation: "load_data",
                state: self.state,
            });
        }
        let raw = self.source.fetch(request)?;
        info!(
            series = %raw.series,
            platform = %raw.platform,
            samples = raw.phenotype.n_samples(),
            features = raw.expression.feature_ids().len(),
            "loaded dataset"
        );
        self.state = SessionState::Loaded;
        Ok(self.raw.insert(raw))
    }

    pub fn assemble(
        &mut self,
        options: &AssemblyOptions,
    ) -> Result<&ExpressionMatrix, AssistantError> {
        let raw = match (self.state, self.raw.as_ref()) {
            (SessionState::Loaded, Some(raw)) => raw,
            (SessionState::Empty, _) | (_, None) => {
                return Err(AssistantError::NotLoaded {
                    operation: "assemble",
                    required: "a loaded dataset",
                });
            }
            (state, Some(_)) => {
                return Err(AssistantError::IllegalState {
                    operation: "assemble",
                    state,
                });
            }
        };
        let matrix = assemble(raw, options)?;
        self.state = SessionState::Assembled;
        Ok(self.matrix.insert(matrix))
    }

    // A second call compounds the log transform.
    pub fn normalize(
        &mut self,
        options: NormalizeOptions,
    ) -> Result<NormalizeSummary, AssistantError> {
        match self.state {
            SessionState::Assembled | SessionState::Normalized => {}
            SessionState::Empty | SessionState::Loaded => {
                return Err(AssistantError::NotLoaded {
                    operation: "normalize",
                    required: "an assembled expression matrix",
                });
            }
            state => {
                return Err(AssistantError::IllegalState {
                    operation: "normalize",
                    state,
                });
            }
        }
        let matrix = self.matrix.as_mut().ok_or(AssistantError::NotLoaded {
            operation: "normalize",
            required: "an assembled expression matrix",
        })?;
        let summary = normalize(matrix, options);
        self.normalize_summary = Some(summary);
        self.state = SessionState::Normalized;
        Ok(summary)
    }

    pub fn fit(&mut self, options: &FitOptions) -> Result<&DifferentialExpression, AssistantError> {
        match self.state {
            SessionState::Normalized | SessionState::Fitted => {}
            SessionState::Empty | SessionState::Loaded => {
                return Err(AssistantError::NotLoaded {
                    operation: "fit",
                    required: "a normalized expression matrix",
                });
            }
            state => {
                return Err(AssistantError::IllegalState {
                    operation: "fit",
                    state,
                });
            }
        }
        let matrix = self.matrix.as_ref().ok_or(AssistantError::NotLoaded {
            operation: "fit",
            required: "a normalized expression matrix",
        })?;
        let result = fit_differential_expression(matrix, options)?;
        self.state = SessionState::Fitted;
        Ok(self.result.insert(result))
    }

    pub fn data_overview(&self) -> Result<String, AssistantError> {
        self.matrix
            .as_ref()
            .map(ToString::to_string)
            .ok_or(AssistantError::NotLoaded {
                operation: "data_overview",
                required: "an assembled expression matrix",
            })
    }

    pub fn ask(&self, question: &str) -> R {
        let mut request = AskModelRequest::new(question, self.gateway.model.clone());
        request.max_tokens = self.gateway.max_tokens;
        request.temperature = self.gateway.temperature;
        ask_model(
            &self.transport,
            &request,
            &self.gateway.base_url,
            &self.gateway.headers,
        )
    }
}

impl<S, T, R> Assistant for MicroarrayAssistant<S, T, R>
where
    S: DatasetSource,
    T: ChatTransport,
    R: ModelResponse,
{
    type DataRequest = DatasetRequest;
    type NormalizeOptions = NormalizeOptions;

    fn get_data(&mut self, request: DatasetRequest) -> Result<(), AssistantError> {
        self.load_data(&request).map(|_| ())
    }

    fn normalize_data(&mut self, options: NormalizeOptions) -> Result<(), AssistantError> {
        self.normalize(options).map(|_| ())
    }

    fn answer_question(&self, question: &str) -> String {
        self.ask(question).content().to_string()
    }
}
