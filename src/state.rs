//! Application state: in-memory stores, game sessions, pipeline client, and selection logic.
//!
//! This module owns:
//!   - question stores (by id, by difficulty, last-by-difficulty)
//!   - game sessions (current question, clicks, running totals)
//!   - the optional pipeline client
//!
//! The selection policy prefers a freshly generated pipeline question.
//! If the pipeline is unavailable or fails, we fall back to the existing
//! pool for the difficulty, then to a built-in hard fallback.

use std::{collections::HashMap, sync::Arc};

use rand::seq::SliceRandom;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::annotate;
use crate::config::{load_game_config_from_env, GameConfig};
use crate::domain::{Click, Difficulty, Question, QuestionRecord, QuestionSource, ScoreResult};
use crate::pipeline::{PipelineClient, PipelineStep};
use crate::seeds::{hard_fallback_parsed, seed_questions};

/// Guesses allowed per question; the budget-exhausting click auto-scores.
pub const CLICK_BUDGET: usize = 3;

/// One finished question inside a session.
#[derive(Clone, Debug)]
pub struct SessionResult {
    pub question_id: String,
    pub title: String,
    pub score: f32,
}

/// Per-player state: the question being played, clicks so far, and totals.
/// Never persisted; lives exactly as long as the process.
#[derive(Clone, Debug)]
pub struct GameSession {
    pub id: String,
    pub current: Option<String>,
    pub clicks: Vec<Click>,
    pub scored: Option<ScoreResult>,
    pub results: Vec<SessionResult>,
    pub total_score: f32,
}

impl GameSession {
    pub fn new(id: String) -> Self {
        Self {
            id,
            current: None,
            clicks: Vec::new(),
            scored: None,
            results: Vec::new(),
            total_score: 0.0,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub by_id: Arc<RwLock<HashMap<String, QuestionRecord>>>,
    pub by_diff: Arc<RwLock<HashMap<Difficulty, Vec<String>>>>,
    pub last_by_diff: Arc<RwLock<HashMap<Difficulty, String>>>,
    pub sessions: Arc<RwLock<HashMap<String, GameSession>>>,
    pub pipeline: Option<PipelineClient>,
    pub default_topic: String,
}

impl AppState {
    /// Build state from env: load config, parse the bank and seeds, init the
    /// pipeline client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg_opt = load_game_config_from_env();
        let pipeline = PipelineClient::from_env(cfg_opt.as_ref().map(|c| &c.pipeline));
        if let Some(p) = &pipeline {
            info!(target: "bughunt_backend", base_url = %p.base_url, max_retries = p.max_retries, "Pipeline enabled.");
        } else {
            info!(target: "bughunt_backend", "Pipeline disabled (no PIPELINE_BASE_URL). Using local pool/seed logic.");
        }
        Self::with_parts(cfg_opt, pipeline)
    }

    /// Build state from explicit parts. `new()` wires these from env.
    pub fn with_parts(cfg_opt: Option<GameConfig>, pipeline: Option<PipelineClient>) -> Self {
        let default_topic = cfg_opt
            .as_ref()
            .and_then(|c| c.pipeline.default_topic.clone())
            .unwrap_or_else(|| "transformer attention".to_string());

        let mut id_map = HashMap::<String, QuestionRecord>::new();
        let mut diff_map = HashMap::<Difficulty, Vec<String>>::new();

        // Insert config-bank questions (if any). Entries naming an unknown
        // difficulty or failing annotation parse are skipped, not fatal.
        if let Some(cfg) = &cfg_opt {
            for (idx, qc) in cfg.questions.iter().enumerate() {
                let id = format!("bank-{}", idx + 1);
                let Some(difficulty) = Difficulty::from_label(&qc.difficulty) else {
                    error!(target: "question", %id, difficulty = %qc.difficulty, "Skipping bank item: unknown difficulty.");
                    continue;
                };
                let raw = Question {
                    title: qc.title.clone(),
                    difficulty,
                    code: qc.code.clone(),
                    errors: qc.errors.clone(),
                };
                let parsed = match annotate::parse(&raw) {
                    Ok(p) => p,
                    Err(e) => {
                        error!(target: "question", %id, error = %e, "Skipping bank item: annotation parse failed.");
                        continue;
                    }
                };
                diff_map.entry(difficulty).or_default().push(id.clone());
                id_map.insert(
                    id.clone(),
                    QuestionRecord { id, source: QuestionSource::LocalBank, parsed },
                );
            }
        }

        // Always insert built-in seeds. They are authored with annotations and
        // run through the real parser; a seed that fails to parse is a bug,
        // logged and skipped rather than served broken.
        for (idx, q) in seed_questions().into_iter().enumerate() {
            let id = format!("seed-{}", idx + 1);
            match annotate::parse(&q) {
                Ok(parsed) => {
                    diff_map.entry(parsed.difficulty).or_default().push(id.clone());
                    id_map.insert(
                        id.clone(),
                        QuestionRecord { id, source: QuestionSource::Seed, parsed },
                    );
                }
                Err(e) => {
                    error!(target: "question", %id, error = %e, "Skipping seed: annotation parse failed.")
                }
            }
        }

        // Inventory summary by difficulty/source.
        let mut count_by_diff: HashMap<Difficulty, (usize, usize, usize)> = HashMap::new();
        for rec in id_map.values() {
            let entry = count_by_diff.entry(rec.parsed.difficulty).or_insert((0, 0, 0));
            match rec.source {
                QuestionSource::LocalBank => entry.0 += 1,
                QuestionSource::Pipeline => entry.1 += 1,
                QuestionSource::Seed => entry.2 += 1,
            }
        }
        for (diff, (bank, pipeline_n, seed)) in count_by_diff {
            info!(target: "question", %diff, local_bank = bank, pipeline = pipeline_n, seed = seed, "Startup question inventory");
        }

        Self {
            by_id: Arc::new(RwLock::new(id_map)),
            by_diff: Arc::new(RwLock::new(diff_map)),
            last_by_diff: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            pipeline,
            default_topic,
        }
    }

    /// Insert a question into stores (by_id and by_diff).
    #[instrument(level = "debug", skip(self, rec), fields(id = %rec.id))]
    pub async fn insert_question(&self, rec: QuestionRecord) {
        let mut by_id = self.by_id.write().await;
        let mut by_diff = self.by_diff.write().await;
        let id = rec.id.clone();
        let diff = rec.parsed.difficulty;
        by_id.insert(id.clone(), rec);
        by_diff.entry(diff).or_default().push(id);
    }

    /// Read-only access to a question by id.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_question(&self, id: &str) -> Option<QuestionRecord> {
        let by_id = self.by_id.read().await;
        by_id.get(id).cloned()
    }

    /// Selection policy:
    /// Generate a fresh question via the pipeline when available (streaming
    /// step events into `steps` if a sender is given). Otherwise serve from
    /// the existing pool, avoiding the last-served id for the difficulty.
    /// Otherwise, insert a hard fallback.
    #[instrument(level = "info", skip(self, steps), fields(%difficulty, topic = ?topic))]
    pub async fn choose_question(
        &self,
        difficulty: Difficulty,
        topic: Option<&str>,
        steps: Option<mpsc::Sender<PipelineStep>>,
    ) -> (QuestionRecord, &'static str) {
        if let Some(pipe) = &self.pipeline {
            let topic = topic.unwrap_or(&self.default_topic);
            let generated = match steps {
                Some(tx) => pipe.generate_streaming(topic, Some(difficulty), tx).await,
                None => pipe.generate(topic, Some(difficulty)).await,
            };
            match generated {
                Ok(raw) => match annotate::parse(&raw) {
                    Ok(parsed) => {
                        let rec = QuestionRecord {
                            id: Uuid::new_v4().to_string(),
                            source: QuestionSource::Pipeline,
                            parsed,
                        };
                        self.insert_question(rec.clone()).await;
                        self.last_by_diff
                            .write()
                            .await
                            .insert(rec.parsed.difficulty, rec.id.clone());
                        info!(target: "question", %difficulty, chosen = %rec.id, source = "pipeline_generated_new", "Generated fresh question");
                        return (rec, "pipeline_generated_new");
                    }
                    Err(e) => {
                        error!(target: "question", %difficulty, error = %e, "Pipeline question failed annotation parse; falling back");
                    }
                },
                Err(e) => {
                    error!(target: "question", %difficulty, error = %e, "Pipeline generation failed; falling back");
                }
            }
        } else {
            warn!(target: "question", %difficulty, "PIPELINE_BASE_URL not set; trying existing pool then hard fallback");
        }

        // 2) If we already have questions for this difficulty (local bank,
        // built-in seeds, or cached pipeline output), serve one of them,
        // avoiding an immediate repeat when the pool allows it.
        if let Some(ids) = { self.by_diff.read().await.get(&difficulty).cloned() } {
            if !ids.is_empty() {
                let last = { self.last_by_diff.read().await.get(&difficulty).cloned() };
                let candidates: Vec<&String> = match &last {
                    Some(last_id) if ids.len() > 1 => {
                        ids.iter().filter(|id| *id != last_id).collect()
                    }
                    _ => ids.iter().collect(),
                };
                let chosen_id = candidates
                    .choose(&mut rand::thread_rng())
                    .map(|id| (*id).clone())
                    .unwrap_or_else(|| ids[0].clone());

                if let Some(rec) = { self.by_id.read().await.get(&chosen_id).cloned() } {
                    self.last_by_diff.write().await.insert(difficulty, chosen_id.clone());
                    warn!(target: "question", %difficulty, chosen = %chosen_id, source = "existing_pool", "Serving existing question");
                    return (rec, "existing_pool");
                }
            }
        }

        // 3) Absolute last resort: hard fallback.
        let rec = QuestionRecord {
            id: Uuid::new_v4().to_string(),
            source: QuestionSource::Seed,
            parsed: hard_fallback_parsed(difficulty),
        };
        self.insert_question(rec.clone()).await;
        self.last_by_diff.write().await.insert(difficulty, rec.id.clone());
        warn!(target: "question", %difficulty, chosen = %rec.id, source = "hard_fallback", "Inserted hard fallback question");
        (rec, "hard_fallback")
    }

    /// Create a fresh session and return it.
    #[instrument(level = "debug", skip(self))]
    pub async fn new_session(&self) -> GameSession {
        let s = GameSession::new(Uuid::new_v4().to_string());
        self.sessions.write().await.insert(s.id.clone(), s.clone());
        info!(target: "question", session = %s.id, "Session created");
        s
    }

    /// Read-only access to a session by id.
    pub async fn get_session(&self, id: &str) -> Option<GameSession> {
        self.sessions.read().await.get(id).cloned()
    }
}
