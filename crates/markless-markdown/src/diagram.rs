use markless_bridge::BridgeError;
use markless_bridge::DiagramRequest;
use markless_bridge::RendererBridge;
use markless_core::cache::RenderCache;
use markless_core::decoration::RenderedImage;

/// A rendered image, or the reason rendering failed. Failures are cached like successes.
pub type RenderOutcome = Result<RenderedImage, String>;

/// Identity of a diagram render: the same source renders differently per theme.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DiagramKey {
    pub source: String,
    pub dark: bool,
}

/// A diagram discovered during a pass whose render is not cached yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagramJob {
    pub key: DiagramKey,
    pub font_family: String,
}

impl DiagramJob {
    pub fn request(&self) -> DiagramRequest {
        DiagramRequest::new(
            self.key.source.clone(),
            self.key.dark,
            self.font_family.clone(),
        )
    }
}

/// Owned result of one [`render_jobs`] run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiagramBatch {
    pub outcomes: Vec<(DiagramKey, RenderOutcome)>,
    /// Jobs left for a later pass because the renderer was unavailable.
    pub deferred: Vec<DiagramJob>,
}

impl DiagramBatch {
    pub fn rendered(&self) -> usize {
        self.outcomes.iter().filter(|(_, outcome)| outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.rendered()
    }

    /// Whether storing the batch changes the diagram cache (a re-run pass would look different).
    pub fn changed(&self) -> bool {
        !self.outcomes.is_empty()
    }

    /// Moves every outcome into `cache`, failures included.
    pub fn store(self, cache: &mut RenderCache<DiagramKey, RenderOutcome>) -> Vec<DiagramJob> {
        for (key, outcome) in self.outcomes {
            cache.insert(key, outcome);
        }
        self.deferred
    }
}

/// Renders `jobs` one at a time through `bridge`.
///
/// Renders that fail or time out are returned as failures so the caller can cache them. If the
/// renderer is not ready (or gone) the remaining jobs come back in [`DiagramBatch::deferred`].
pub async fn render_jobs(bridge: &RendererBridge, jobs: Vec<DiagramJob>) -> DiagramBatch {
    let mut batch = DiagramBatch::default();
    let mut jobs = jobs.into_iter();
    while let Some(job) = jobs.next() {
        match bridge.render(job.request()).await {
            Ok(image) => batch.outcomes.push((job.key, Ok(image))),
            Err(err @ (BridgeError::NotReady | BridgeError::Closed)) => {
                batch.deferred.push(job);
                batch.deferred.extend(jobs);
                tracing::debug!(%err, deferred = batch.deferred.len(), "diagram rendering deferred");
                break;
            }
            Err(err) => {
                tracing::warn!(%err, "diagram render failed");
                batch.outcomes.push((job.key, Err(err.to_string())));
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use markless_bridge::channel;
    use std::time::Duration;

    fn job(source: &str) -> DiagramJob {
        DiagramJob {
            key: DiagramKey {
                source: source.to_string(),
                dark: true,
            },
            font_family: "monospace".to_string(),
        }
    }

    #[tokio::test]
    async fn unready_renderer_defers_everything() {
        let (bridge, _endpoint) = channel(Duration::from_secs(1));
        let batch = render_jobs(&bridge, vec![job("a"), job("b")]).await;
        assert_eq!(batch.deferred, vec![job("a"), job("b")]);
        assert!(!batch.changed());

        let mut cache = RenderCache::unbounded();
        assert_eq!(batch.store(&mut cache).len(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn failures_are_cached() {
        let (bridge, endpoint) = channel(Duration::from_secs(1));
        let host = endpoint.serve(|req| {
            if req.source == "bad" {
                Err("parse error".to_string())
            } else {
                Ok(RenderedImage::svg(format!("<svg>{}</svg>", req.source)))
            }
        });
        let client = async {
            bridge.ready().await.unwrap();
            let batch = render_jobs(&bridge, vec![job("ok"), job("bad")]).await;
            drop(bridge);
            batch
        };
        let (batch, ()) = tokio::join!(client, host);
        assert_eq!(batch.rendered(), 1);
        assert_eq!(batch.failed(), 1);

        let mut cache = RenderCache::unbounded();
        assert!(batch.store(&mut cache).is_empty());
        assert!(cache.get(&job("ok").key).unwrap().is_ok());
        assert!(cache.get(&job("bad").key).unwrap().is_err());
    }
}
