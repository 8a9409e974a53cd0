//! Per-request pipeline.
//!
//! Schema capture, request building, generation, validation, execution and
//! chart inference run strictly in sequence. Any failure ends the request
//! with a reason code; nothing is retried here and nothing is kept between
//! requests.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::chart::{self, ChartSpec, ResultShaper};
use crate::config::{Limits, LlmConfig};
use crate::db::{DataStore, Row, SchemaCatalog};
use crate::error::{AskError, ErrorCode, Result};
use crate::llm::{
    CandidateQuery, ConversationTurn, LlmClient, TranslationRequest, TranslationRequestBuilder,
};
use crate::query::{ExecutionResult, QueryExecutor};
use crate::safety::{screen_question, QueryValidator, RejectionReason};

/// One question from a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    pub user_question: String,

    /// Prior turns, oldest first. Only the newest few are used.
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,

    /// Model to use; the configured default when absent.
    #[serde(default)]
    pub model_id: Option<String>,

    /// Opaque to the pipeline.
    #[serde(default)]
    pub session_context: Option<serde_json::Value>,

    #[serde(default)]
    pub chart_x: Option<String>,

    #[serde(default)]
    pub chart_y: Option<String>,
}

impl QuestionRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            user_question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.conversation_history = history;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_id = Some(model.into());
        self
    }

    pub fn with_chart_axes(mut self, x: Option<String>, y: Option<String>) -> Self {
        self.chart_x = x;
        self.chart_y = y;
        self
    }
}

/// Outcome of one question. Exactly one of rows or an error code is meaningful.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResponse {
    /// The statement that was validated, when the service produced one.
    pub sql_query: Option<String>,
    pub rows: Vec<Row>,
    pub truncated: bool,
    pub total_count_estimate: Option<u64>,
    pub chart_spec: Option<ChartSpec>,
    /// The question asked for a graph or chart.
    pub chart_requested: bool,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
}

impl QuestionResponse {
    pub fn is_success(&self) -> bool {
        self.error_code.is_none()
    }
}

/// Why a request ended early.
#[derive(Debug)]
struct Failure {
    code: ErrorCode,
    message: String,
    sql: Option<String>,
}

impl Failure {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidRequest,
            message: message.into(),
            sql: None,
        }
    }

    fn cancelled() -> Self {
        Self {
            code: ErrorCode::Cancelled,
            message: "The request was cancelled".to_string(),
            sql: None,
        }
    }

    fn rejected(reason: RejectionReason, normalized: String) -> Self {
        // sentinels are not SQL
        let sql = match reason {
            RejectionReason::ModelRefusal | RejectionReason::Unanswerable => None,
            _ => Some(normalized),
        };
        Self {
            code: reason.code(),
            message: reason.user_message(),
            sql,
        }
    }

    fn with_sql(mut self, sql: &str) -> Self {
        self.sql = Some(sql.to_string());
        self
    }
}

impl From<AskError> for Failure {
    fn from(error: AskError) -> Self {
        Self {
            code: error.code(),
            message: error.message().to_string(),
            sql: None,
        }
    }
}

struct Answer {
    sql: String,
    result: ExecutionResult,
    chart: Option<ChartSpec>,
}

/// Runs the question-to-rows pipeline against one store.
///
/// Holds no per-request state and may be shared behind an `Arc`.
pub struct Orchestrator {
    catalog: SchemaCatalog,
    builder: TranslationRequestBuilder,
    llm: Arc<dyn LlmClient>,
    validator: QueryValidator,
    executor: QueryExecutor,
    shaper: ResultShaper,
    llm_config: LlmConfig,
}

impl Orchestrator {
    /// Wires the pipeline from explicit configuration.
    pub fn new(
        store: Arc<dyn DataStore>,
        llm: Arc<dyn LlmClient>,
        llm_config: &LlmConfig,
        limits: &Limits,
    ) -> Self {
        let builder = TranslationRequestBuilder::new(store.dialect())
            .with_history_turns(limits.history_turns)
            .with_schema_budget(limits.schema_budget());

        Self {
            catalog: SchemaCatalog::new(Arc::clone(&store), limits.query_timeout()),
            builder,
            llm,
            validator: QueryValidator::new(),
            executor: QueryExecutor::new(store, limits.max_rows, limits.query_timeout()),
            shaper: ResultShaper::new(),
            llm_config: llm_config.clone(),
        }
    }

    /// Answers one question. Failures are reported in the response.
    pub async fn ask(
        &self,
        request: &QuestionRequest,
        cancel: &CancellationToken,
    ) -> QuestionResponse {
        let start = Instant::now();
        let chart_requested = chart::wants_chart(&request.user_question);

        let response = match self.run(request, cancel).await {
            Ok(answer) => QuestionResponse {
                sql_query: Some(answer.sql),
                rows: answer.result.rows,
                truncated: answer.result.truncated,
                total_count_estimate: answer.result.total_count_estimate,
                chart_spec: answer.chart,
                chart_requested,
                error_code: None,
                error_message: None,
            },
            Err(failure) => QuestionResponse {
                sql_query: failure.sql,
                chart_requested,
                error_code: Some(failure.code),
                error_message: Some(failure.message),
                ..QuestionResponse::default()
            },
        };

        info!(
            rows = response.rows.len(),
            truncated = response.truncated,
            error_code = response.error_code.map(|c| c.as_str()),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Question answered"
        );
        response
    }

    async fn run(
        &self,
        request: &QuestionRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<Answer, Failure> {
        let question = request.user_question.trim();
        if question.is_empty() {
            return Err(Failure::invalid("The question is empty"));
        }

        let model = request
            .model_id
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.llm_config.model);
        if !self.llm_config.is_model_allowed(model) {
            return Err(Failure::invalid(format!(
                "Model '{model}' is not allowed. Allowed models: {}",
                self.llm_config.allowed_models.join(", ")
            )));
        }

        if let Some(reason) = screen_question(question) {
            return Err(Failure::rejected(reason, String::new()));
        }

        let schema = staged(cancel, "schema", self.catalog.capture()).await?;

        let translation =
            self.builder
                .build(schema, &request.conversation_history, question, model);
        let raw = staged(cancel, "generate", self.generate(&translation)).await?;

        let candidate = CandidateQuery::from_response(raw);
        if candidate.is_empty() {
            return Err(Failure::rejected(RejectionReason::Unanswerable, String::new()));
        }
        debug!(sql = %candidate, "Candidate query");

        let verdict = self.validator.validate(candidate.sql());
        let normalized = verdict.normalized_text().to_string();
        let accepted = verdict
            .into_result()
            .map_err(|reason| Failure::rejected(reason, normalized))?;

        let result = staged(cancel, "execute", self.executor.execute(&accepted))
            .await
            .map_err(|failure| failure.with_sql(accepted.as_str()))?;

        let chart = self.shaper.infer(
            &result.rows,
            request.chart_x.as_deref(),
            request.chart_y.as_deref(),
        );

        Ok(Answer {
            sql: accepted.as_str().to_string(),
            result,
            chart,
        })
    }

    async fn generate(&self, translation: &TranslationRequest) -> Result<String> {
        let timeout = self.llm_config.timeout();
        let messages = translation.messages();

        tokio::time::timeout(
            timeout,
            self.llm.complete(
                translation.model(),
                translation.system_prompt(),
                &messages,
            ),
        )
        .await
        .map_err(|_| generation_timeout(timeout))?
    }
}

fn generation_timeout(timeout: Duration) -> AskError {
    AskError::timeout(format!(
        "Generation timed out after {} seconds",
        timeout.as_secs()
    ))
}

/// Runs one stage unless the request is cancelled first.
///
/// Cancellation drops the stage future, which abandons any in-flight store
/// statement or HTTP request it owns.
async fn staged<T>(
    cancel: &CancellationToken,
    stage: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> std::result::Result<T, Failure> {
    let start = Instant::now();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(stage, "Stage cancelled");
            return Err(Failure::cancelled());
        }
        outcome = fut => outcome,
    };

    debug!(
        stage,
        ok = outcome.is_ok(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Stage finished"
    );
    outcome.map_err(Failure::from)
}
