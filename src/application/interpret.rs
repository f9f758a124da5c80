//! Interpretation service: the request pipeline.
//!
//! This service coordinates:
//! - Request coercion and parameter normalization
//! - Result cache lookup and store
//! - Routing between clinical rules and trained models
//! - Attribution and assembly of the response

use serde_json::Value;

use crate::domain::{
    assess_risks, build_features, classify_by_threshold, match_canonical, normalize_parameter_name,
    schema_feature_names, ClassificationResult, InterpretRequest, InterpretationResponse,
    RiskAssessments, RiskPanel,
};
use crate::ports::{argmax, CacheKey, ModelArtifact, ModelStore, ResultCache, TemplateCatalog};
use crate::BloodXaiError;

use super::assembler::ResultAssembler;
use super::explain::{ExplainabilityReconciler, Explanation};
use super::model_cache::{ModelCache, ModelRouter, Route};

/// Classification plus what is needed to explain and assemble it.
struct Classified {
    result: ClassificationResult,
    explanation: Explanation,
    feature_names: Vec<String>,
}

/// Service turning one inbound request into an interpretation record.
pub struct InterpretationService<S, C, T>
where
    S: ModelStore,
    C: ResultCache,
    T: TemplateCatalog,
{
    models: ModelCache<S>,
    router: ModelRouter,
    reconciler: ExplainabilityReconciler,
    assembler: ResultAssembler<T>,
    cache: C,
}

impl<S, C, T> InterpretationService<S, C, T>
where
    S: ModelStore,
    C: ResultCache,
    T: TemplateCatalog,
{
    /// Create a service with the default router and reconciler.
    pub fn new(store: S, cache: C, templates: T) -> Self {
        Self {
            models: ModelCache::new(store),
            router: ModelRouter::default(),
            reconciler: ExplainabilityReconciler::default(),
            assembler: ResultAssembler::new(templates),
            cache,
        }
    }

    #[must_use]
    pub fn with_router(mut self, router: ModelRouter) -> Self {
        self.router = router;
        self
    }

    #[must_use]
    pub fn with_reconciler(mut self, reconciler: ExplainabilityReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Load every model the store lists. Returns how many loaded.
    pub fn preload_models(&self) -> usize {
        let loaded = self.models.preload();
        tracing::info!(loaded, "Preloaded model artifacts");
        loaded
    }

    /// Canonical keys with a loaded model, sorted.
    pub fn loaded_models(&self) -> Vec<String> {
        self.models.loaded_keys()
    }

    /// Empty the result cache.
    ///
    /// # Errors
    /// Returns error if the cache backend fails.
    pub fn clear_cache(&self) -> Result<usize, BloodXaiError> {
        let removed = self
            .cache
            .clear()
            .map_err(|e| BloodXaiError::Cache(e.to_string()))?;
        tracing::info!(removed, "Cleared result cache");
        Ok(removed)
    }

    /// Interpret one request payload.
    ///
    /// # Errors
    /// Returns [`BloodXaiError::SchemaMismatch`] when the built features
    /// cannot be projected onto the model's input schema. Every other fault
    /// is recovered and logged.
    pub fn interpret(&self, payload: &Value) -> Result<InterpretationResponse, BloodXaiError> {
        let mut request = InterpretRequest::from_json(payload);
        if request.parameter_defaulted {
            tracing::warn!(parameter = %request.parameter, "Request named no parameter; using default");
        }

        let key = normalize_parameter_name(&request.parameter, self.models.loaded_keys());
        tracing::info!(parameter = %key, "Interpreting parameter");
        request.parameter.clone_from(&key);

        let cache_key = CacheKey::from_request(&request);
        match self.cache.get(&cache_key) {
            Ok(Some(hit)) => {
                tracing::debug!(cache_key = %cache_key, "Result cache hit");
                return Ok(hit);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Result cache lookup failed; treating as miss"),
        }

        let classified = match self.router.route(&key, &self.models) {
            Route::Statistical(artifact) => self.classify_with_model(&artifact, &request, &key)?,
            Route::ClinicalRules(reason) => {
                tracing::info!(parameter = %key, ?reason, "Using clinical threshold rules");
                classify_with_rules(&request, &key)
            }
        };

        tracing::info!(
            parameter = %key,
            status = %classified.result.status,
            label = %classified.result.label,
            source = ?classified.result.source,
            "Classified"
        );

        let response = self.assembler.assemble(
            &key,
            request.value,
            &classified.result,
            &classified.explanation,
            classified.feature_names,
        );

        if let Err(e) = self.cache.put(&cache_key, &response) {
            tracing::warn!(error = %e, "Failed to store result in cache");
        }
        Ok(response)
    }

    /// Multi-parameter risk assessments for a request payload.
    ///
    /// Reads the whole panel; the result is not cached.
    pub fn assess_risks(&self, payload: &Value) -> RiskAssessments {
        let request = InterpretRequest::from_json(payload);
        let primary = if request.parameter_defaulted {
            None
        } else {
            match_canonical(&request.parameter)
        };
        let panel = RiskPanel::from_request(&request, primary);
        tracing::info!(values = panel.values.len(), "Assessing risks");
        assess_risks(&panel)
    }

    fn classify_with_model(
        &self,
        artifact: &ModelArtifact,
        request: &InterpretRequest,
        key: &str,
    ) -> Result<Classified, BloodXaiError> {
        let expected = artifact
            .feature_names
            .clone()
            .unwrap_or_else(schema_feature_names);
        let features = build_features(request).reindex(&expected)?;
        let x = features.values();

        let proba = match artifact.classifier.predict_proba(x) {
            Ok(proba) => proba,
            Err(e) => {
                tracing::warn!(parameter = key, error = %e, "Model produced no probabilities");
                return Ok(degraded(artifact, features.names(), x, request, key, &e.to_string()));
            }
        };
        let Some(mapped) = argmax(&proba) else {
            return Ok(degraded(artifact, features.names(), x, request, key, "empty probability vector"));
        };
        let status = match artifact.class_mapping.to_original(mapped) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(parameter = key, error = %e, "Predicted class has no status code");
                return Ok(Classified {
                    explanation: Explanation::failed(e.to_string()),
                    ..classify_with_rules(request, key)
                });
            }
        };

        // Probabilities are indexed by mapped class.
        let result = ClassificationResult::from_model(status, proba[mapped]);
        let explanation = self.reconciler.explain(artifact, x, features.names(), mapped);
        tracing::debug!(
            parameter = key,
            method = ?explanation.method,
            entries = explanation.entries.len(),
            "Explained prediction"
        );

        Ok(Classified {
            result,
            explanation,
            feature_names: features.names().to_vec(),
        })
    }
}

fn classify_with_rules(request: &InterpretRequest, key: &str) -> Classified {
    let verdict = classify_by_threshold(request.value, key, request.patient.gender, request.patient.age);
    Classified {
        result: ClassificationResult::from_rules(verdict),
        explanation: Explanation::default(),
        feature_names: Vec::new(),
    }
}

/// Model without probabilities: keep its class if it has one, report zero
/// confidence and no attributions.
fn degraded(
    artifact: &ModelArtifact,
    names: &[String],
    x: &[f64],
    request: &InterpretRequest,
    key: &str,
    reason: &str,
) -> Classified {
    let error = format!("Attribution unavailable: {reason}");
    let status = artifact
        .classifier
        .predict(x)
        .ok()
        .and_then(|mapped| artifact.class_mapping.to_original(mapped).ok());

    match status {
        Some(status) => Classified {
            result: ClassificationResult::from_model(status, 0.0),
            explanation: Explanation::failed(error),
            feature_names: names.to_vec(),
        },
        None => Classified {
            explanation: Explanation::failed(error),
            ..classify_with_rules(request, key)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{JsonTemplateCatalog, MemoryResultCache};
    use crate::application::model_cache::tests::StubStore;
    use crate::domain::{round3, DecisionSource, Direction, StatusCode, UNTABULATED_CONFIDENCE};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Service = InterpretationService<StubStore, MemoryResultCache, JsonTemplateCatalog>;

    fn service(model_keys: Vec<&'static str>) -> Service {
        InterpretationService::new(
            StubStore::new(model_keys),
            MemoryResultCache::default(),
            JsonTemplateCatalog::embedded().expect("catalog"),
        )
    }

    #[derive(Debug, thiserror::Error)]
    #[error("cache backend offline")]
    struct Offline;

    /// Cache whose backend is always unreachable.
    #[derive(Default)]
    struct OfflineCache {
        gets: AtomicUsize,
        puts: AtomicUsize,
    }

    impl ResultCache for OfflineCache {
        type Error = Offline;

        fn get(&self, _key: &CacheKey) -> Result<Option<InterpretationResponse>, Self::Error> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Err(Offline)
        }

        fn put(&self, _key: &CacheKey, _response: &InterpretationResponse) -> Result<(), Self::Error> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            Err(Offline)
        }

        fn clear(&self) -> Result<usize, Self::Error> {
            Err(Offline)
        }
    }

    #[test]
    fn test_hemoglobin_without_model_uses_rules() {
        let svc = service(vec!["wbc_10e9_L"]);
        let response = svc
            .interpret(&json!({
                "parameter": "Hemoglobin (Hb)",
                "value": 10.5,
                "patientGender": "Female",
                "patientAge": 35
            }))
            .expect("response");
        let interp = &response.interpretation;
        assert_eq!(interp.parameter, "hemoglobin_g_dL");
        assert_eq!(interp.explainability.status_code, StatusCode::Low);
        assert_eq!(interp.explainability.model_prediction, "Low");
        assert_eq!(interp.explainability.confidence, 0.95);
        assert_eq!(interp.explainability.decision_source, DecisionSource::ClinicalRules);
        assert!(interp.introduction.contains("anemia"));
        assert!(interp.explainability.feature_importances.is_empty());
        assert!(response.shap_values.is_none());
        assert!(response.shap_error.is_none());
    }

    #[test]
    fn test_non_numeric_value_is_coerced_to_zero() {
        let svc = service(Vec::new());
        let response = svc
            .interpret(&json!({ "parameter": "Platelet Count", "value": "abc" }))
            .expect("response");
        assert!((response.interpretation.value - 0.0).abs() < f64::EPSILON);
        assert_eq!(response.interpretation.parameter, "platelet_count");
    }

    #[test]
    fn test_missing_parameter_defaults_to_hemoglobin() {
        let svc = service(Vec::new());
        let response = svc.interpret(&json!({ "value": 14.0 })).expect("response");
        assert_eq!(response.interpretation.parameter, "hemoglobin_g_dL");
    }

    #[test]
    fn test_model_path_predicts_and_explains() {
        let svc = service(vec!["wbc_10e9_L"]);
        let response = svc
            .interpret(&json!({
                "parameter": "Total WBC Count",
                "value": 14.0,
                "otherParameters": { "wbc_10e9_L": 14.0 }
            }))
            .expect("response");
        let explainability = &response.interpretation.explainability;
        assert_eq!(explainability.decision_source, DecisionSource::Model);
        assert_eq!(explainability.status_code, StatusCode::Low);
        assert!(explainability.confidence > 0.99);
        assert_eq!(explainability.feature_importances.len(), 1);
        assert_eq!(explainability.feature_importances[0].feature, "wbc_10e9_L");
        assert_eq!(explainability.feature_importances[0].direction, Direction::Increases);
        assert_eq!(response.feature_names, vec!["wbc_10e9_L".to_string()]);
        assert_eq!(response.shap_values.as_ref().map(Vec::len), Some(1));
        assert!(response.shap_error.is_none());
    }

    #[test]
    fn test_low_accuracy_model_is_never_loaded() {
        let svc = service(vec!["monocytes_percent"]);
        let response = svc
            .interpret(&json!({ "parameter": "Monocytes", "value": 12.0 }))
            .expect("response");
        assert_eq!(
            response.interpretation.explainability.decision_source,
            DecisionSource::ClinicalRules
        );
        assert!(svc.loaded_models().is_empty());
    }

    #[test]
    fn test_second_identical_request_hits_cache() {
        let svc = service(vec!["wbc_10e9_L"]);
        let payload = json!({
            "parameter": "WBC",
            "value": 14.0,
            "otherParameters": { "wbc_10e9_L": 14.0 }
        });
        let first = svc.interpret(&payload).expect("first");
        svc.models.clear();
        let mut tagged = payload.clone();
        tagged["requestId"] = json!("abc-123");
        let second = svc.interpret(&tagged).expect("second");
        assert_eq!(first, second);
        assert_eq!(svc.models.store().loads.load(Ordering::SeqCst), 1);
        assert_eq!(svc.clear_cache().expect("clear"), 1);
    }

    #[test]
    fn test_schema_mismatch_is_a_request_failure() {
        let svc = service(vec!["duplicated"]);
        let err = svc
            .interpret(&json!({ "parameter": "duplicated", "value": 1.0 }))
            .expect_err("schema mismatch");
        assert!(matches!(err, BloodXaiError::SchemaMismatch(_)));
    }

    #[test]
    fn test_risk_assessment_reads_whole_panel() {
        let svc = service(Vec::new());
        let risks = svc.assess_risks(&json!({
            "parameter": "Hemoglobin",
            "value": 7.5,
            "patientGender": "Male",
            "otherParameters": { "mcv_fL": 70.0 }
        }));
        assert!(risks.anemia_profile.kind.starts_with("Microcytic"));
    }

    #[test]
    fn test_shipped_tree_model_end_to_end() {
        let store = crate::adapters::FileModelStore::new(concat!(env!("CARGO_MANIFEST_DIR"), "/models"))
            .require_signed(false);
        let svc = InterpretationService::new(
            store,
            MemoryResultCache::default(),
            JsonTemplateCatalog::embedded().expect("catalog"),
        );
        assert_eq!(svc.preload_models(), 1);

        let response = svc
            .interpret(&json!({
                "parameter": "WBC Count",
                "value": 14.0,
                "patientAge": 45,
                "otherParameters": { "wbc_10e9_L": 14.0, "neutrophils_percent": 70.0 }
            }))
            .expect("response");
        let explainability = &response.interpretation.explainability;
        assert_eq!(explainability.decision_source, DecisionSource::Model);
        assert_eq!(explainability.status_code, StatusCode::High);
        assert_eq!(explainability.feature_importances[0].feature, "wbc_10e9_L");
        assert_eq!(explainability.feature_importances[0].direction, Direction::Increases);
        assert_eq!(response.feature_names.len(), 5);
        assert!(response.shap_error.is_none());
        assert!(response.interpretation.abnormal_findings.is_some());
    }

    #[test]
    fn test_unknown_parameter_reports_low_confidence_normal() {
        let svc = service(Vec::new());
        let response = svc
            .interpret(&json!({ "parameter": "Serum Lipase", "value": 9999 }))
            .expect("response");
        let explainability = &response.interpretation.explainability;
        assert_eq!(response.interpretation.parameter, "serum_lipase");
        assert_eq!(explainability.status_code, StatusCode::Normal);
        assert_eq!(explainability.decision_source, DecisionSource::ClinicalRules);
        assert_eq!(explainability.confidence, UNTABULATED_CONFIDENCE);
    }

    #[test]
    fn test_remapped_classes_report_status_and_mapped_probability() {
        let svc = service(vec!["remapped"]);
        let response = svc
            .interpret(&json!({ "parameter": "remapped", "value": 1.0 }))
            .expect("response");
        let explainability = &response.interpretation.explainability;
        assert_eq!(explainability.decision_source, DecisionSource::Model);
        // Mapped class 2 is status code 3.
        assert_eq!(explainability.status_code, StatusCode::Critical);
        assert_eq!(explainability.model_prediction, "Critical");

        let margins = [0.0_f64, 1.0, 2.0];
        let total: f64 = margins.iter().map(|m| m.exp()).sum();
        assert_eq!(explainability.confidence, round3(margins[2].exp() / total));
        assert_eq!(response.feature_names, vec!["remapped".to_string()]);
    }

    #[test]
    fn test_model_without_probabilities_keeps_its_class() {
        let svc = service(vec!["opaque"]);
        let response = svc
            .interpret(&json!({ "parameter": "opaque", "value": 1.0 }))
            .expect("response");
        let explainability = &response.interpretation.explainability;
        assert_eq!(explainability.decision_source, DecisionSource::Model);
        assert_eq!(explainability.status_code, StatusCode::Low);
        assert_eq!(explainability.confidence, 0.0);
        assert!(explainability.feature_importances.is_empty());
        assert!(response.shap_values.is_none());
        let error = response.shap_error.as_deref().expect("error");
        assert!(error.starts_with("Attribution unavailable"));
        assert!(error.contains("calibration missing"));
        assert_eq!(response.feature_names, vec!["opaque".to_string()]);
    }

    #[test]
    fn test_model_without_any_output_falls_back_to_rules() {
        let svc = service(vec!["silent"]);
        let response = svc
            .interpret(&json!({ "parameter": "silent", "value": 1.0 }))
            .expect("response");
        let explainability = &response.interpretation.explainability;
        assert_eq!(explainability.decision_source, DecisionSource::ClinicalRules);
        assert_eq!(explainability.status_code, StatusCode::Normal);
        assert!(response.shap_error.is_some());
    }

    #[test]
    fn test_unreachable_cache_is_a_miss() {
        let svc = InterpretationService::new(
            StubStore::new(Vec::new()),
            OfflineCache::default(),
            JsonTemplateCatalog::embedded().expect("catalog"),
        );
        let payload = json!({ "parameter": "Hb", "value": 10.5, "patientGender": "Female" });
        let first = svc.interpret(&payload).expect("first");
        let second = svc.interpret(&payload).expect("second");
        assert_eq!(first, second);
        assert_eq!(first.interpretation.explainability.status_code, StatusCode::Low);
        assert_eq!(svc.cache.gets.load(Ordering::SeqCst), 2);
        assert_eq!(svc.cache.puts.load(Ordering::SeqCst), 2);
        assert!(matches!(svc.clear_cache(), Err(BloodXaiError::Cache(_))));
    }
}
