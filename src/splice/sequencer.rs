use super::fixer::ContinuityFixer;
use crate::error::{Result, TsError};
use crate::format::ts::TSPacket;
use crate::format::{shared, PacketSource, SharedSource};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How many times the source list is played.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopMode {
    #[default]
    Once,
    /// Play the list this many times. Must be greater than zero.
    Count(u32),
    Infinite,
}

impl LoopMode {
    pub fn validate(&self) -> Result<()> {
        match self {
            LoopMode::Count(0) => Err(TsError::InvalidLoopCount),
            _ => Ok(()),
        }
    }

    /// True when sources have to be rewound between passes.
    pub fn repeats(&self) -> bool {
        match self {
            LoopMode::Once => false,
            LoopMode::Count(n) => *n > 1,
            LoopMode::Infinite => true,
        }
    }

    fn has_pass_after(&self, completed_passes: u32) -> bool {
        match self {
            LoopMode::Once => false,
            LoopMode::Count(n) => completed_passes < *n,
            LoopMode::Infinite => true,
        }
    }
}

struct SequencerState {
    sources: Vec<SharedSource>,
    current: Option<SharedSource>,
    index: usize,
    loop_mode: LoopMode,
    completed_passes: u32,
    packets_this_pass: u64,
    fixer: Option<ContinuityFixer>,
    pending_close: Vec<SharedSource>,
    all_resettable: bool,
    finished: bool,
}

/// Plays a list of sources back to back as a single source, optionally
/// looping and repairing continuity at every switch.
///
/// The list can be replaced while playing through a [`SequencerHandle`].
pub struct SourceSequencer {
    state: Arc<Mutex<SequencerState>>,
}

/// Cloneable handle for updating the source list of a running sequencer.
#[derive(Clone)]
pub struct SequencerHandle {
    state: Arc<Mutex<SequencerState>>,
}

pub struct SequencerBuilder {
    sources: Vec<SharedSource>,
    loop_mode: LoopMode,
    fix_continuity: bool,
    splice_gap: Duration,
}

impl Default for SequencerBuilder {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            loop_mode: LoopMode::Once,
            fix_continuity: true,
            splice_gap: Duration::ZERO,
        }
    }
}

impl SequencerBuilder {
    pub fn add_source<S: PacketSource + 'static>(mut self, source: S) -> Self {
        self.sources.push(shared(source));
        self
    }

    pub fn add_shared(mut self, source: SharedSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_sources(mut self, sources: Vec<SharedSource>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_loop_mode(mut self, loop_mode: LoopMode) -> Self {
        self.loop_mode = loop_mode;
        self
    }

    pub fn with_fix_continuity(mut self, fix_continuity: bool) -> Self {
        self.fix_continuity = fix_continuity;
        self
    }

    /// Gap inserted into PTS and PCR at each splice point.
    pub fn with_splice_gap(mut self, splice_gap: Duration) -> Self {
        self.splice_gap = splice_gap;
        self
    }

    pub async fn build(self) -> Result<SourceSequencer> {
        self.loop_mode.validate()?;
        let all_resettable = check_sources(&self.sources, self.loop_mode).await?;

        let fixer = self
            .fix_continuity
            .then(|| ContinuityFixer::new().with_splice_gap(self.splice_gap));

        let state = SequencerState {
            current: self.sources.first().cloned(),
            sources: self.sources,
            index: 0,
            loop_mode: self.loop_mode,
            completed_passes: 0,
            packets_this_pass: 0,
            fixer,
            pending_close: Vec::new(),
            all_resettable,
            finished: false,
        };

        Ok(SourceSequencer {
            state: Arc::new(Mutex::new(state)),
        })
    }
}

/// Validates a source list and reports whether every source is resettable.
async fn check_sources(sources: &[SharedSource], loop_mode: LoopMode) -> Result<bool> {
    if sources.is_empty() {
        return Err(TsError::NoSources);
    }

    let mut all_resettable = true;
    for source in sources {
        all_resettable &= source.lock().await.is_resettable();
    }

    if loop_mode.repeats() && !all_resettable {
        return Err(TsError::NotResettable);
    }
    Ok(all_resettable)
}

impl SourceSequencer {
    pub fn builder() -> SequencerBuilder {
        SequencerBuilder::default()
    }

    /// Repeats a single source.
    pub async fn looping<S: PacketSource + 'static>(source: S, loop_mode: LoopMode) -> Result<Self> {
        Self::builder()
            .add_source(source)
            .with_loop_mode(loop_mode)
            .build()
            .await
    }

    pub fn handle(&self) -> SequencerHandle {
        SequencerHandle {
            state: self.state.clone(),
        }
    }

    /// Replaces the source list. See [`SequencerHandle::update_sources`].
    pub async fn update_sources(&self, sources: Vec<SharedSource>) -> Result<()> {
        self.handle().update_sources(sources).await
    }

    /// Number of fully played passes over the source list.
    pub async fn completed_passes(&self) -> u32 {
        self.state.lock().await.completed_passes
    }
}

impl SequencerHandle {
    /// Replaces the source list while playing.
    ///
    /// Removed sources that are not playing are closed right away. A removed
    /// playing source keeps playing until exhausted and is closed then.
    /// Playback continues after the playing source if it is still listed,
    /// otherwise at the position it occupied.
    pub async fn update_sources(&self, sources: Vec<SharedSource>) -> Result<()> {
        let mut state = self.state.lock().await;
        let all_resettable = check_sources(&sources, state.loop_mode).await?;

        let old = std::mem::replace(&mut state.sources, sources);
        state.all_resettable = all_resettable;

        // a source listed again is no longer due to close
        let SequencerState {
            sources,
            pending_close,
            ..
        } = &mut *state;
        pending_close.retain(|pending| !sources.iter().any(|s| Arc::ptr_eq(s, pending)));

        for source in old {
            if state.sources.iter().any(|s| Arc::ptr_eq(s, &source)) {
                continue;
            }
            let playing = state
                .current
                .as_ref()
                .map_or(false, |current| Arc::ptr_eq(current, &source));
            if playing {
                debug!("Playing source removed, closing it once exhausted");
                state.pending_close.push(source);
            } else {
                close_source(&source).await;
            }
        }

        info!("Source list updated, {} sources", state.sources.len());
        Ok(())
    }
}

async fn close_source(source: &SharedSource) {
    if let Err(e) = source.lock().await.close().await {
        warn!("Failed to close source: {}", e);
    }
}

impl SequencerState {
    async fn next_packet(&mut self) -> Result<Option<TSPacket>> {
        loop {
            if self.finished {
                return Ok(None);
            }
            let Some(source) = self.current.clone() else {
                self.finished = true;
                return Ok(None);
            };

            let next = source.lock().await.next_packet().await?;
            match next {
                Some(mut packet) => {
                    self.packets_this_pass += 1;
                    if let Some(fixer) = self.fixer.as_mut() {
                        fixer.fix_continuity(&mut packet);
                    }
                    return Ok(Some(packet));
                }
                None => self.advance(source).await?,
            }
        }
    }

    /// Moves past an exhausted source, wrapping around when looping.
    async fn advance(&mut self, exhausted: SharedSource) -> Result<()> {
        self.current = None;

        if let Some(pos) = self
            .pending_close
            .iter()
            .position(|s| Arc::ptr_eq(s, &exhausted))
        {
            let source = self.pending_close.remove(pos);
            close_source(&source).await;
        }

        let still_listed = self
            .sources
            .get(self.index)
            .filter(|s| Arc::ptr_eq(s, &exhausted))
            .map(|_| self.index)
            .or_else(|| self.sources.iter().position(|s| Arc::ptr_eq(s, &exhausted)));
        let next_index = match still_listed {
            Some(pos) => pos + 1,
            None => self.index,
        };

        if next_index < self.sources.len() {
            self.switch_to(next_index);
            return Ok(());
        }

        self.completed_passes += 1;
        if self.packets_this_pass == 0 {
            warn!("A full pass over all sources produced no packets, stopping");
            self.finished = true;
            return Ok(());
        }
        if !self.loop_mode.has_pass_after(self.completed_passes) {
            debug!("All sources played, {} passes", self.completed_passes);
            self.finished = true;
            return Ok(());
        }

        info!("Restarting sources, pass {}", self.completed_passes + 1);
        for source in &self.sources {
            source.lock().await.reset().await?;
        }
        self.packets_this_pass = 0;
        self.switch_to(0);
        Ok(())
    }

    fn switch_to(&mut self, index: usize) {
        debug!("Switching to source {}", index);
        self.index = index;
        self.current = self.sources.get(index).cloned();
        if let Some(fixer) = self.fixer.as_mut() {
            fixer.next_source();
        }
    }

    async fn close_all(&mut self) -> Result<()> {
        let mut result = Ok(());
        for source in self.sources.iter().chain(self.pending_close.iter()) {
            if let Err(e) = source.lock().await.close().await {
                warn!("Failed to close source: {}", e);
                result = Err(e);
            }
        }
        self.pending_close.clear();
        self.current = None;
        self.finished = true;
        result
    }
}

#[async_trait::async_trait]
impl PacketSource for SourceSequencer {
    async fn next_packet(&mut self) -> Result<Option<TSPacket>> {
        self.state.lock().await.next_packet().await
    }

    fn is_resettable(&self) -> bool {
        self.state
            .try_lock()
            .map_or(false, |state| state.all_resettable)
    }

    /// Restarts from the first source, rewinding every source.
    async fn reset(&mut self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.all_resettable {
            return Err(TsError::NotResettable);
        }
        for source in &state.sources {
            source.lock().await.reset().await?;
        }
        state.completed_passes = 0;
        state.packets_this_pass = 0;
        state.finished = false;
        state.switch_to(0);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.state.lock().await.close_all().await
    }
}
