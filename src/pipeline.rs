//! Content pipeline for Readlevel.
//!
//! Wires the store, splitter, generator, orchestrator, audio matcher and
//! review workflow together behind the operations the CLI and the HTTP
//! server expose.

use crate::audio::{AudioConfig, AudioMatcher, HttpAudioLibrary, HttpSynthesizer};
use crate::batch::{BatchItem, BatchJob, BatchOrchestrator, BatchOutcome, BatchTask, JobKind, JobProgress};
use crate::config::{AssessmentProvider, Prompts, Settings, StoreProvider};
use crate::error::{ReadLevelError, Result};
use crate::import::{import_materials, FieldMapping, ImportOptions, ImportReport, JsonTableSource, TableSource};
use crate::lexile::{
    classify, words_of, Classification, HeuristicAssessor, LexileAssessor, LexileClassifier, OpenAIAssessor,
};
use crate::material::{ListeningMaterial, NewMaterial};
use crate::review::{ReviewDecision, ReviewRecord, ReviewTask, ReviewWorkflow};
use crate::splitter::{Chapter, ChapterSplitter, OpenAISegmenter, SplitStrategy};
use crate::store::{ContentStore, MemoryContentStore, SqliteContentStore};
use crate::versions::{
    compare, validate_difficulty, validate_target_lexile, ChapterVersion, OpenAIRewriter, Rewriter,
    VersionComparison, VersionGenerator,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, instrument};
use uuid::Uuid;

/// Request for a single version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateVersion {
    pub version_label: String,
    pub difficulty: u8,
    #[serde(default)]
    pub target_lexile: Option<i32>,
    #[serde(default = "default_author")]
    pub created_by: String,
}

/// Request for one version per chapter and difficulty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchGenerate {
    pub version_label: String,
    pub difficulties: Vec<u8>,
    #[serde(default)]
    pub target_lexile: Option<i32>,
    #[serde(default = "default_author")]
    pub created_by: String,
}

fn default_author() -> String {
    "readlevel".to_string()
}

/// Label of the version generated for `difficulty` in a batch.
pub fn batch_version_label(version_label: &str, difficulty: u8) -> String {
    format!("{}-d{}", version_label, difficulty)
}

fn parse_id(kind: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ReadLevelError::Validation(format!("Invalid {} id '{}': {}", kind, raw, e)))
}

fn validate_label(label: &str) -> Result<()> {
    if label.trim().is_empty() {
        return Err(ReadLevelError::Validation("Version label is empty".to_string()));
    }
    Ok(())
}

/// Collaborators a pipeline is assembled from.
pub struct Components {
    pub store: Arc<dyn ContentStore>,
    pub rewriter: Arc<dyn Rewriter>,
    pub assessor: Arc<dyn LexileAssessor>,
    pub splitter: ChapterSplitter,
    pub matcher: AudioMatcher,
    pub table_source: Arc<dyn TableSource>,
}

#[derive(Clone)]
pub struct Pipeline {
    settings: Settings,
    store: Arc<dyn ContentStore>,
    splitter: ChapterSplitter,
    generator: VersionGenerator,
    orchestrator: BatchOrchestrator,
    matcher: AudioMatcher,
    reviews: ReviewWorkflow,
    table_source: Arc<dyn TableSource>,
}

impl Pipeline {
    /// Build a pipeline from configuration.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let store: Arc<dyn ContentStore> = match settings.store.provider {
            StoreProvider::Sqlite => Arc::new(SqliteContentStore::new(&settings.sqlite_path())?),
            StoreProvider::Memory => Arc::new(MemoryContentStore::new()),
        };

        let assessor: Arc<dyn LexileAssessor> = match settings.assessment.provider {
            AssessmentProvider::OpenAI => {
                info!("Using OpenAI Lexile assessment ({})", settings.assessment.model);
                Arc::new(OpenAIAssessor::new(&settings.assessment.model, prompts.clone())?)
            }
            AssessmentProvider::Heuristic => {
                info!("Using heuristic Lexile assessment");
                Arc::new(HeuristicAssessor::new())
            }
        };

        let rewriter = Arc::new(OpenAIRewriter::new(
            &settings.rewrite.model,
            settings.rewrite.temperature,
            prompts.clone(),
        )?);

        let mut splitter = ChapterSplitter::new();
        if settings.splitting.semantic_enabled {
            splitter = splitter.with_segmenter(Arc::new(OpenAISegmenter::new(
                &settings.splitting.segmentation_model,
                prompts,
            )?));
        }

        let timeout = Duration::from_secs(settings.tts.timeout_secs);
        let mut matcher = AudioMatcher::new(settings.batch.retry_policy());
        if let Some(endpoint) = settings.tts.endpoint.as_deref() {
            matcher = matcher.with_synthesizer(Arc::new(HttpSynthesizer::new(
                endpoint,
                settings.tts.api_key.clone(),
                timeout,
            )?));
        }
        if let Some(endpoint) = settings.library.endpoint.as_deref() {
            matcher = matcher.with_library(Arc::new(HttpAudioLibrary::new(endpoint, timeout)?));
        }

        let table_source = Arc::new(JsonTableSource::new(settings.records_dir()));

        Ok(Self::with_components(
            settings,
            Components {
                store,
                rewriter,
                assessor,
                splitter,
                matcher,
                table_source,
            },
        ))
    }

    /// Build a pipeline around the given collaborators.
    pub fn with_components(settings: Settings, components: Components) -> Self {
        let retry = settings.batch.retry_policy();
        let classifier = LexileClassifier::new(components.assessor, retry);
        let generator = VersionGenerator::new(components.rewriter, classifier, retry);

        Self {
            reviews: ReviewWorkflow::new(components.store.clone()),
            store: components.store,
            splitter: components.splitter,
            generator,
            orchestrator: BatchOrchestrator::new().with_retention(settings.batch.job_retention()),
            matcher: components.matcher,
            table_source: components.table_source,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> Arc<dyn ContentStore> {
        self.store.clone()
    }

    // Chapters

    /// Split a book and save its chapters. `replace` re-splits an existing book.
    #[instrument(skip(self, raw_text))]
    pub async fn split_book(
        &self,
        book_id: &str,
        raw_text: &str,
        max_words: Option<usize>,
        strategy: Option<SplitStrategy>,
        replace: bool,
    ) -> Result<Vec<Chapter>> {
        if book_id.trim().is_empty() {
            return Err(ReadLevelError::Validation("Book id is empty".to_string()));
        }
        let strategy = match strategy {
            Some(s) => s,
            None => self
                .settings
                .splitting
                .strategy
                .parse()
                .map_err(ReadLevelError::Config)?,
        };
        let max_words = max_words.unwrap_or(self.settings.splitting.max_words_per_chapter);

        let chapters = self.splitter.split(book_id, raw_text, max_words, strategy).await?;
        self.store.save_chapters(book_id, &chapters, replace).await?;
        info!("Saved {} chapters for book {}", chapters.len(), book_id);
        Ok(chapters)
    }

    pub async fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>> {
        self.store.list_chapters(book_id).await
    }

    async fn chapter(&self, chapter_id: Uuid) -> Result<Chapter> {
        self.store
            .get_chapter(chapter_id)
            .await?
            .ok_or_else(|| ReadLevelError::NotFound(format!("Chapter {} not found", chapter_id)))
    }

    // Versions

    /// Generate and store a draft version of a chapter.
    #[instrument(skip(self, request), fields(label = %request.version_label))]
    pub async fn create_version(&self, chapter_id: Uuid, request: &CreateVersion) -> Result<ChapterVersion> {
        validate_label(&request.version_label)?;
        let chapter = self.chapter(chapter_id).await?;
        ensure_label_free(self.store.as_ref(), chapter_id, &request.version_label).await?;

        let generated = self
            .generator
            .generate(&chapter.raw_content, request.difficulty, request.target_lexile)
            .await?;
        let version = generated.into_version(
            chapter_id,
            &request.version_label,
            request.difficulty,
            &request.created_by,
        );
        self.store.insert_version(&version).await?;
        Ok(version)
    }

    pub async fn publish_version(&self, version_id: Uuid) -> Result<ChapterVersion> {
        let version = self.store.publish_version(version_id).await?;
        info!("Published version {} ({})", version.version_label, version_id);
        Ok(version)
    }

    pub async fn delete_version(&self, version_id: Uuid) -> Result<()> {
        self.store.delete_version(version_id).await
    }

    pub async fn list_versions(&self, chapter_id: Uuid) -> Result<Vec<ChapterVersion>> {
        self.store.list_versions(chapter_id).await
    }

    pub async fn compare_versions(&self, left: Uuid, right: Uuid) -> Result<VersionComparison> {
        let load = |id: Uuid| async move {
            self.store
                .get_version(id)
                .await?
                .ok_or_else(|| ReadLevelError::NotFound(format!("Version {} not found", id)))
        };
        Ok(compare(&load(left).await?, &load(right).await?))
    }

    /// Start a job generating one version per chapter of the book and difficulty.
    #[instrument(skip(self, request), fields(label = %request.version_label))]
    pub async fn batch_generate(&self, book_id: &str, request: &BatchGenerate) -> Result<Uuid> {
        validate_label(&request.version_label)?;
        if request.difficulties.is_empty() {
            return Err(ReadLevelError::Validation("No difficulties requested".to_string()));
        }
        for difficulty in &request.difficulties {
            validate_difficulty(*difficulty)?;
        }
        validate_target_lexile(request.target_lexile)?;

        let chapters = self.store.list_chapters(book_id).await?;
        if chapters.is_empty() {
            return Err(ReadLevelError::NotFound(format!("Book {} has no chapters", book_id)));
        }

        let mut difficulties = request.difficulties.clone();
        difficulties.sort_unstable();
        difficulties.dedup();

        let mut items = Vec::with_capacity(chapters.len() * difficulties.len());
        for chapter in &chapters {
            for difficulty in &difficulties {
                let params = GenerationParams {
                    version_label: batch_version_label(&request.version_label, *difficulty),
                    difficulty: *difficulty,
                    target_lexile: request.target_lexile,
                    created_by: request.created_by.clone(),
                };
                items.push(BatchItem::new(chapter.id.to_string(), serde_json::to_value(params)?));
            }
        }

        let task = Arc::new(GenerationTask {
            generator: self.generator.clone(),
            store: self.store.clone(),
            estimates: request.target_lexile.is_none(),
        });
        self.orchestrator
            .run(JobKind::VersionGeneration, items, task, self.settings.batch.concurrency_limit)
            .await
    }

    // Jobs

    pub fn job_status(&self, job_id: Uuid) -> Result<BatchJob> {
        self.orchestrator.get_status(job_id)
    }

    pub fn cancel_job(&self, job_id: Uuid) -> Result<BatchJob> {
        self.orchestrator.cancel(job_id)
    }

    pub async fn wait_job(&self, job_id: Uuid) -> Result<BatchJob> {
        self.orchestrator.wait(job_id).await
    }

    pub fn subscribe_job(&self, job_id: Uuid) -> Result<watch::Receiver<JobProgress>> {
        self.orchestrator.subscribe(job_id)
    }

    pub fn list_jobs(&self) -> Result<Vec<BatchJob>> {
        self.orchestrator.list_jobs()
    }

    // Lexile

    pub fn classify(&self, score: i32) -> Result<Classification> {
        classify(score)
    }

    /// Estimate and classify the Lexile level of a text.
    pub async fn estimate(&self, text: &str) -> Result<Classification> {
        let score = self.generator.classifier().estimate(&words_of(text)).await?;
        classify(score)
    }

    // Listening materials

    pub async fn add_material(&self, material: NewMaterial) -> Result<ListeningMaterial> {
        let material = material.into_material()?;
        self.store.insert_material(&material).await?;
        info!("Added material '{}' ({})", material.title, material.id);
        Ok(material)
    }

    pub async fn list_materials(&self) -> Result<Vec<ListeningMaterial>> {
        self.store.list_materials().await
    }

    /// Match audio to a material and save the result.
    pub async fn match_audio(&self, material_id: Uuid, config: &AudioConfig) -> Result<ListeningMaterial> {
        match_and_save(&self.matcher, self.store.as_ref(), material_id, config).await
    }

    /// Start a job matching audio for each material.
    pub async fn batch_match(&self, material_ids: &[Uuid], config: AudioConfig) -> Result<Uuid> {
        config.validate()?;
        let items = material_ids
            .iter()
            .map(|id| BatchItem::new(id.to_string(), serde_json::Value::Null))
            .collect();
        let task = Arc::new(AudioMatchTask {
            matcher: self.matcher.clone(),
            store: self.store.clone(),
            config,
        });
        self.orchestrator
            .run(JobKind::AudioMatch, items, task, self.settings.batch.concurrency_limit)
            .await
    }

    pub async fn review(&self, material_id: Uuid, decision: &ReviewDecision) -> Result<ReviewRecord> {
        self.reviews.review(material_id, decision).await
    }

    pub async fn reset_review(&self, material_id: Uuid) -> Result<ListeningMaterial> {
        self.reviews.reset(material_id).await
    }

    pub async fn review_history(&self, material_id: Uuid) -> Result<Vec<ReviewRecord>> {
        self.reviews.history(material_id).await
    }

    pub async fn batch_review(&self, material_ids: &[Uuid], decision: &ReviewDecision) -> Result<BatchOutcome> {
        self.reviews.batch_review(material_ids, decision).await
    }

    /// Start a job applying the same review decision to each material.
    pub async fn review_job(&self, material_ids: &[Uuid], decision: &ReviewDecision) -> Result<Uuid> {
        decision.validate()?;
        let params = serde_json::to_value(decision)?;
        let items = material_ids
            .iter()
            .map(|id| BatchItem::new(id.to_string(), params.clone()))
            .collect();
        self.orchestrator
            .run(
                JobKind::Review,
                items,
                Arc::new(ReviewTask::new(self.reviews.clone())),
                self.settings.batch.concurrency_limit,
            )
            .await
    }

    /// Import materials from a table. `options` defaults to the configured import settings.
    pub async fn import_materials(
        &self,
        table_id: &str,
        mapping: &FieldMapping,
        options: Option<ImportOptions>,
    ) -> Result<ImportReport> {
        let options = options.unwrap_or(ImportOptions {
            skip_existing: self.settings.import.skip_existing,
        });
        import_materials(
            self.table_source.as_ref(),
            self.store.as_ref(),
            table_id,
            mapping,
            options,
        )
        .await
    }
}

/// Fail with a conflict before paying for a rewrite whose insert would be rejected.
async fn ensure_label_free(store: &dyn ContentStore, chapter_id: Uuid, version_label: &str) -> Result<()> {
    if store
        .list_versions(chapter_id)
        .await?
        .iter()
        .any(|v| v.version_label == version_label)
    {
        return Err(ReadLevelError::Conflict(format!(
            "Version '{}' already exists for chapter {}",
            version_label, chapter_id
        )));
    }
    Ok(())
}

async fn match_and_save(
    matcher: &AudioMatcher,
    store: &dyn ContentStore,
    material_id: Uuid,
    config: &AudioConfig,
) -> Result<ListeningMaterial> {
    let material = store
        .get_material(material_id)
        .await?
        .ok_or_else(|| ReadLevelError::NotFound(format!("Material {} not found", material_id)))?;

    // Matching can be slow; a review applied meanwhile must survive the write.
    let matched = matcher.match_material(&material, config).await?;
    store.set_audio(material_id, &matched).await
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerationParams {
    version_label: String,
    difficulty: u8,
    target_lexile: Option<i32>,
    created_by: String,
}

/// Version generation job: item targets are chapter ids.
struct GenerationTask {
    generator: VersionGenerator,
    store: Arc<dyn ContentStore>,
    estimates: bool,
}

#[async_trait]
impl BatchTask for GenerationTask {
    async fn preflight(&self) -> Result<()> {
        self.generator.preflight(self.estimates).await
    }

    async fn execute(&self, item: &BatchItem) -> Result<serde_json::Value> {
        let chapter_id = parse_id("chapter", &item.target_id)?;
        let params: GenerationParams = serde_json::from_value(item.params.clone())?;

        let chapter = self
            .store
            .get_chapter(chapter_id)
            .await?
            .ok_or_else(|| ReadLevelError::NotFound(format!("Chapter {} not found", chapter_id)))?;
        ensure_label_free(self.store.as_ref(), chapter_id, &params.version_label).await?;

        let version = self
            .generator
            .generate(&chapter.raw_content, params.difficulty, params.target_lexile)
            .await?
            .into_version(chapter_id, &params.version_label, params.difficulty, &params.created_by);
        self.store.insert_version(&version).await?;

        Ok(serde_json::json!({
            "version_id": version.id,
            "version_label": version.version_label,
            "word_count": version.word_count,
            "lexile_level": version.lexile_level,
            "quality": version.quality,
        }))
    }
}

/// Audio match job: item targets are material ids.
struct AudioMatchTask {
    matcher: AudioMatcher,
    store: Arc<dyn ContentStore>,
    config: AudioConfig,
}

#[async_trait]
impl BatchTask for AudioMatchTask {
    async fn preflight(&self) -> Result<()> {
        self.matcher.preflight(self.config.source)
    }

    async fn execute(&self, item: &BatchItem) -> Result<serde_json::Value> {
        let material_id = parse_id("material", &item.target_id)?;
        let material = match_and_save(&self.matcher, self.store.as_ref(), material_id, &self.config).await?;
        Ok(serde_json::json!({
            "audio_url": material.audio_url,
            "audio_source": material.audio_source,
            "match_confidence": material.match_confidence,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioHit, SpeechRequest, SpeechSynthesizer};
    use crate::batch::JobStatus;
    use crate::import::{MaterialField, TableRecord};
    use crate::material::{AudioSource, ReviewStatus};
    use crate::retry::RetryPolicy;
    use crate::review::ReviewVerdict;
    use crate::versions::{LexileSource, VersionStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Notify, Semaphore};

    /// Shortens text to its first `keep` words; fails on chapters containing "FAIL".
    struct TruncatingRewriter {
        keep: usize,
    }

    #[async_trait]
    impl Rewriter for TruncatingRewriter {
        async fn rewrite(&self, text: &str, _difficulty: u8, _target: Option<i32>) -> Result<String> {
            if text.contains("FAIL") {
                return Err(ReadLevelError::Validation("rewrite refused".into()));
            }
            Ok(text.split_whitespace().take(self.keep).collect::<Vec<_>>().join(" "))
        }
    }

    /// Echoes its input and counts calls.
    #[derive(Default)]
    struct CountingRewriter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Rewriter for CountingRewriter {
        async fn rewrite(&self, text: &str, _difficulty: u8, _target: Option<i32>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_string())
        }
    }

    struct OfflineRewriter;

    #[async_trait]
    impl Rewriter for OfflineRewriter {
        async fn rewrite(&self, text: &str, _difficulty: u8, _target: Option<i32>) -> Result<String> {
            Ok(text.to_string())
        }

        async fn check(&self) -> Result<()> {
            Err(ReadLevelError::ServiceUnavailable("offline".into()))
        }
    }

    struct FixedSynth;

    #[async_trait]
    impl SpeechSynthesizer for FixedSynth {
        async fn synthesize(&self, request: &SpeechRequest) -> Result<AudioHit> {
            Ok(AudioHit {
                url: format!("https://tts.example.com/{}.mp3", request.voice),
                confidence: Some(0.9),
            })
        }
    }

    struct Records(Vec<TableRecord>);

    #[async_trait]
    impl TableSource for Records {
        async fn fetch_records(&self, _table_id: &str) -> Result<Vec<TableRecord>> {
            Ok(self.0.clone())
        }
    }

    /// Signals when synthesis starts, then blocks until a permit is released.
    struct GatedSynth {
        entered: Notify,
        gate: Semaphore,
    }

    #[async_trait]
    impl SpeechSynthesizer for GatedSynth {
        async fn synthesize(&self, _request: &SpeechRequest) -> Result<AudioHit> {
            self.entered.notify_one();
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| ReadLevelError::ExternalService(e.to_string()))?;
            permit.forget();
            Ok(AudioHit {
                url: "https://tts.example.com/slow.mp3".into(),
                confidence: Some(0.7),
            })
        }
    }

    fn pipeline_with(rewriter: Arc<dyn Rewriter>) -> Pipeline {
        pipeline_from(rewriter, Arc::new(FixedSynth))
    }

    fn pipeline_from(rewriter: Arc<dyn Rewriter>, synthesizer: Arc<dyn SpeechSynthesizer>) -> Pipeline {
        let mut settings = Settings::default();
        settings.batch.initial_backoff_ms = 1;
        let record = TableRecord {
            record_id: "r1".into(),
            fields: serde_json::json!({"title": "Imported", "text": "Some imported text."})
                .as_object()
                .cloned()
                .unwrap(),
        };
        Pipeline::with_components(
            settings,
            Components {
                store: Arc::new(MemoryContentStore::new()),
                rewriter,
                assessor: Arc::new(HeuristicAssessor::new()),
                splitter: ChapterSplitter::new(),
                matcher: AudioMatcher::new(RetryPolicy::none()).with_synthesizer(synthesizer),
                table_source: Arc::new(Records(vec![record])),
            },
        )
    }

    fn pipeline() -> Pipeline {
        pipeline_with(Arc::new(TruncatingRewriter { keep: 8 }))
    }

    fn book(paragraphs: usize) -> String {
        (0..paragraphs)
            .map(|i| format!("Paragraph {} tells of a small boat that sailed across the quiet bay at dawn.", i))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[tokio::test]
    async fn test_split_then_resplit() {
        let p = pipeline();
        let chapters = p
            .split_book("b1", &book(6), Some(30), Some(SplitStrategy::Paragraph), false)
            .await
            .unwrap();
        assert_eq!(chapters.len(), 3);

        let again = p.split_book("b1", &book(2), Some(30), None, false).await;
        assert!(matches!(again, Err(ReadLevelError::Conflict(_))));

        let replaced = p.split_book("b1", &book(2), Some(30), None, true).await.unwrap();
        assert_eq!(replaced.len(), 1);
        assert_eq!(p.list_chapters("b1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_publish_and_compare_versions() {
        let p = pipeline();
        let chapter = p.split_book("b1", &book(1), None, None, false).await.unwrap().remove(0);

        let request = CreateVersion {
            version_label: "1.0.0".into(),
            difficulty: 2,
            target_lexile: None,
            created_by: "editor".into(),
        };
        let v1 = p.create_version(chapter.id, &request).await.unwrap();
        assert_eq!(v1.word_count, 8);
        assert_eq!(v1.lexile_source, LexileSource::Computed);
        assert!(v1.lexile_level.is_some());
        assert_eq!(v1.status, VersionStatus::Draft);
        assert!(v1.quality.is_some());

        assert!(matches!(
            p.create_version(chapter.id, &request).await,
            Err(ReadLevelError::Conflict(_))
        ));

        let v2 = p
            .create_version(
                chapter.id,
                &CreateVersion {
                    version_label: "1.1.0".into(),
                    target_lexile: Some(500),
                    ..request.clone()
                },
            )
            .await
            .unwrap();
        assert_eq!(v2.lexile_level, Some(500));

        p.publish_version(v1.id).await.unwrap();
        p.publish_version(v2.id).await.unwrap();
        let versions = p.list_versions(chapter.id).await.unwrap();
        let statuses: Vec<_> = versions.iter().map(|v| (v.version_label.as_str(), v.status)).collect();
        assert!(statuses.contains(&("1.0.0", VersionStatus::Archived)));
        assert!(statuses.contains(&("1.1.0", VersionStatus::Published)));

        let cmp = p.compare_versions(v1.id, v2.id).await.unwrap();
        assert!(cmp.same_chapter);
        assert_eq!(cmp.word_count_delta, 0);

        p.delete_version(v1.id).await.unwrap();
        assert_eq!(p.list_versions(chapter.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_version_unknown_chapter() {
        let request = CreateVersion {
            version_label: "1.0.0".into(),
            difficulty: 1,
            target_lexile: None,
            created_by: "editor".into(),
        };
        let result = pipeline().create_version(Uuid::new_v4(), &request).await;
        assert!(matches!(result, Err(ReadLevelError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_batch_generate_labels_and_partial_failure() {
        let p = pipeline();
        let text = format!("{}\n\nFAIL this paragraph cannot be rewritten.", book(1));
        let chapters = p
            .split_book("b1", &text, Some(16), Some(SplitStrategy::Paragraph), false)
            .await
            .unwrap();
        assert_eq!(chapters.len(), 2);

        let job_id = p
            .batch_generate(
                "b1",
                &BatchGenerate {
                    version_label: "2.0".into(),
                    difficulties: vec![3, 1, 3],
                    target_lexile: Some(450),
                    created_by: "batch".into(),
                },
            )
            .await
            .unwrap();
        let job = p.wait_job(job_id).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.items.len(), 4);
        let outcome = job.outcome();
        assert_eq!(outcome.succeeded.len(), 2);
        assert_eq!(
            outcome.failed_ids(),
            vec![chapters[1].id.to_string(), chapters[1].id.to_string()]
        );
        assert!(outcome.failed.iter().all(|f| f.error.contains("rewrite refused")));

        let labels: Vec<String> = p
            .list_versions(chapters[0].id)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.version_label)
            .collect();
        assert!(labels.contains(&"2.0-d1".to_string()));
        assert!(labels.contains(&"2.0-d3".to_string()));
    }

    #[tokio::test]
    async fn test_batch_generate_rerun_skips_rewrite_for_existing_labels() {
        let rewriter = Arc::new(CountingRewriter::default());
        let p = pipeline_with(rewriter.clone());
        let chapters = p
            .split_book("b1", &book(2), Some(16), Some(SplitStrategy::Paragraph), false)
            .await
            .unwrap();
        let request = BatchGenerate {
            version_label: "3.0".into(),
            difficulties: vec![2],
            target_lexile: Some(400),
            created_by: "batch".into(),
        };

        let first = p.wait_job(p.batch_generate("b1", &request).await.unwrap()).await.unwrap();
        assert_eq!(first.outcome().succeeded.len(), 2);
        assert_eq!(first.items[0].result.as_ref().unwrap()["quality"]["passed"], true);
        assert_eq!(rewriter.calls.load(Ordering::SeqCst), 2);

        let rerun = p.wait_job(p.batch_generate("b1", &request).await.unwrap()).await.unwrap();
        let outcome = rerun.outcome();
        assert!(outcome.succeeded.is_empty());
        assert_eq!(outcome.failed.len(), 2);
        assert!(outcome.failed.iter().all(|f| f.error.starts_with("Conflict:")));
        assert_eq!(rewriter.calls.load(Ordering::SeqCst), 2);
        assert_eq!(p.list_versions(chapters[0].id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_generate_validation() {
        let p = pipeline();
        let request = BatchGenerate {
            version_label: "1".into(),
            difficulties: vec![2],
            target_lexile: None,
            created_by: "batch".into(),
        };
        assert!(matches!(
            p.batch_generate("missing", &request).await,
            Err(ReadLevelError::NotFound(_))
        ));

        let bad = BatchGenerate {
            difficulties: vec![2, 8],
            ..request
        };
        assert!(matches!(
            p.batch_generate("missing", &bad).await,
            Err(ReadLevelError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_generate_preflight_failure() {
        let p = pipeline_with(Arc::new(OfflineRewriter));
        p.split_book("b1", &book(1), None, None, false).await.unwrap();
        let result = p
            .batch_generate(
                "b1",
                &BatchGenerate {
                    version_label: "1".into(),
                    difficulties: vec![1],
                    target_lexile: None,
                    created_by: "batch".into(),
                },
            )
            .await;
        assert!(matches!(result, Err(ReadLevelError::ServiceUnavailable(_))));
        assert!(p.list_jobs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_material_audio_and_review_flow() {
        let p = pipeline();
        let material = p
            .add_material(NewMaterial {
                title: "Harbor".into(),
                content: "The boats come home at night.".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let matched = p.match_audio(material.id, &AudioConfig::default()).await.unwrap();
        assert_eq!(matched.audio_source, Some(AudioSource::Tts));
        assert_eq!(matched.audio_url.as_deref(), Some("https://tts.example.com/female.mp3"));

        let external = AudioConfig {
            source: AudioSource::External,
            url: Some("https://cdn.example.com/harbor.mp3".into()),
            ..Default::default()
        };
        let rematched = p.match_audio(material.id, &external).await.unwrap();
        assert_eq!(rematched.audio_source, Some(AudioSource::External));
        assert_eq!(rematched.match_confidence, Some(1.0));

        let decision = ReviewDecision {
            verdict: ReviewVerdict::Rejected,
            rating: 2,
            feedback: "Audio too fast".into(),
            reviewer: None,
        };
        p.review(material.id, &decision).await.unwrap();
        assert!(matches!(
            p.review(material.id, &decision).await,
            Err(ReadLevelError::Conflict(_))
        ));
        let reset = p.reset_review(material.id).await.unwrap();
        assert_eq!(reset.review_status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn test_review_during_audio_match_is_kept() {
        let synth = Arc::new(GatedSynth {
            entered: Notify::new(),
            gate: Semaphore::new(0),
        });
        let p = pipeline_from(Arc::new(TruncatingRewriter { keep: 8 }), synth.clone());
        let material = p
            .add_material(NewMaterial {
                title: "Lighthouse".into(),
                content: "The light turns all night long.".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let matching = {
            let p = p.clone();
            let id = material.id;
            tokio::spawn(async move { p.match_audio(id, &AudioConfig::default()).await })
        };
        synth.entered.notified().await;

        let decision = ReviewDecision {
            verdict: ReviewVerdict::Approved,
            rating: 5,
            feedback: "Lovely".into(),
            reviewer: None,
        };
        p.review(material.id, &decision).await.unwrap();
        synth.gate.add_permits(1);

        let matched = matching.await.unwrap().unwrap();
        assert_eq!(matched.review_status, ReviewStatus::Approved);
        assert_eq!(matched.audio_url.as_deref(), Some("https://tts.example.com/slow.mp3"));

        let stored = p.store().get_material(material.id).await.unwrap().unwrap();
        assert_eq!(stored.review_status, ReviewStatus::Approved);
        assert_eq!(stored.match_confidence, Some(0.7));
        assert_eq!(p.review_history(material.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_match_job() {
        let p = pipeline();
        let mut ids = Vec::new();
        for title in ["One", "Two", "Three"] {
            let m = p
                .add_material(NewMaterial {
                    title: title.into(),
                    content: format!("{} little ducks went swimming.", title),
                    ..Default::default()
                })
                .await
                .unwrap();
            ids.push(m.id);
        }
        ids.push(Uuid::new_v4());

        let job_id = p.batch_match(&ids, AudioConfig::default()).await.unwrap();
        let job = p.wait_job(job_id).await.unwrap();
        let outcome = job.outcome();
        assert_eq!(outcome.succeeded.len(), 3);
        assert_eq!(outcome.failed_ids(), vec![ids[3].to_string()]);
        assert!(outcome.failed[0].error.starts_with("Not found:"));

        let library = AudioConfig {
            source: AudioSource::Library,
            ..Default::default()
        };
        assert!(matches!(
            p.batch_match(&ids, library).await,
            Err(ReadLevelError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_review_job_and_import() {
        let p = pipeline();
        let mapping = FieldMapping::new([
            ("title".to_string(), MaterialField::Title),
            ("text".to_string(), MaterialField::Content),
        ]);
        let report = p.import_materials("any", &mapping, None).await.unwrap();
        assert_eq!(report.imported.len(), 1);

        let decision = ReviewDecision {
            verdict: ReviewVerdict::Approved,
            rating: 5,
            feedback: "Ready".into(),
            reviewer: Some("lee".into()),
        };
        let job_id = p.review_job(&report.imported, &decision).await.unwrap();
        let job = p.wait_job(job_id).await.unwrap();
        assert_eq!(job.outcome().succeeded, vec![report.imported[0].to_string()]);

        let again = p.import_materials("any", &mapping, None).await.unwrap();
        assert_eq!(again.skipped, vec!["Imported".to_string()]);
    }

    #[tokio::test]
    async fn test_estimate_and_classify() {
        let p = pipeline();
        let c = p.estimate("The cat sat on the mat in the sun.").await.unwrap();
        assert!(c.score >= 200 && c.score <= 1700);
        assert!(matches!(p.estimate("Too short.").await, Err(ReadLevelError::Validation(_))));
        assert_eq!(p.classify(2000).unwrap().score, 1700);
    }

    #[test]
    fn test_batch_version_label() {
        assert_eq!(batch_version_label("1.2.0", 4), "1.2.0-d4");
    }
}
