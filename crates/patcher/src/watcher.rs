//! Re-checks every stored record when the page changes or a timer fires.
//!
//! A pass compares each record's live value with what applying it would leave
//! behind, so a pass that follows its own writes finds nothing to do. Only
//! child-list and character-data changes wake the watcher; the attribute
//! writes of highlights and acknowledgments do not.

use html::{Document, MutationObserver, Notification, ObserveOptions};
use tokio::time::{self, Duration, Instant, Interval, MissedTickBehavior};

use crate::engine::PatchEngine;
use crate::selector::locate;
use crate::store::Modification;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherState {
    Disarmed,
    Armed,
}

/// Why a pass is due.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Mutation,
    Timer,
    /// The document went away; nothing more will be observed.
    Closed,
}

/// Outcome of one reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub checked: usize,
    pub missing: usize,
    pub rewritten: usize,
}

#[derive(Debug)]
pub struct Watcher {
    recheck: Duration,
    armed: Option<(MutationObserver, Interval)>,
}

impl Watcher {
    pub fn new(recheck: Duration) -> Self {
        Self {
            recheck,
            armed: None,
        }
    }

    pub fn state(&self) -> WatcherState {
        if self.armed.is_some() {
            WatcherState::Armed
        } else {
            WatcherState::Disarmed
        }
    }

    /// Subscribe to the document and start the timer. No-op when already armed.
    pub fn arm(&mut self, doc: &Document) {
        if self.armed.is_some() {
            return;
        }
        let mut interval = time::interval_at(Instant::now() + self.recheck, self.recheck);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.armed = Some((doc.observe(ObserveOptions::STRUCTURE), interval));
        log::debug!(target: "patcher::watcher", "armed, recheck every {:?}", self.recheck);
    }

    /// Drop the subscription and the timer.
    pub fn disarm(&mut self) {
        if self.armed.take().is_some() {
            log::debug!(target: "patcher::watcher", "disarmed");
        }
    }

    /// Wait for the next reason to run a pass. Never resolves while disarmed.
    /// Cancel-safe, for use in `select!`.
    pub async fn next_trigger(&mut self) -> Trigger {
        let Some((observer, interval)) = self.armed.as_mut() else {
            return core::future::pending().await;
        };
        tokio::select! {
            notice = observer.next_batch() => match notice {
                Some(Notification::Records(_)) => {
                    // Everything is re-scanned anyway; fold queued batches into this pass.
                    drop(observer.take_records());
                    Trigger::Mutation
                }
                Some(Notification::Lagged(skipped)) => {
                    log::debug!(target: "patcher::watcher", "observer lagged by {skipped} batches");
                    drop(observer.take_records());
                    Trigger::Mutation
                }
                None => Trigger::Closed,
            },
            _ = interval.tick() => Trigger::Timer,
        }
    }

    /// Re-check every record once. Missing targets are skipped.
    pub fn run_pass(
        engine: &mut PatchEngine,
        doc: &mut Document,
        records: &[Modification],
    ) -> PassReport {
        let mut report = PassReport::default();
        for record in records {
            report.checked += 1;
            let Some(node) = locate(doc, &record.selector) else {
                report.missing += 1;
                continue;
            };
            if !engine.has_drifted(doc, node, record.kind, &record.value, records) {
                continue;
            }
            if engine.apply(doc, node, record.kind, &record.value) {
                report.rewritten += 1;
            }
        }
        log::debug!(
            target: "patcher::watcher",
            "pass: checked {} missing {} rewritten {}",
            report.checked,
            report.missing,
            report.rewritten
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ModificationKind;
    use crate::config::PatcherConfig;

    fn record(selector: &str, kind: ModificationKind, value: &str) -> Modification {
        Modification {
            selector: selector.to_owned(),
            kind,
            value: value.to_owned(),
            applied_at: 0,
        }
    }

    const PAGE: &str = r#"<body>
        <h1 id="title">Old</h1>
        <div id="box" style="color: blue">box</div>
        <section id="rich"><i>old</i></section>
        <input id="qty" type="number" value="1">
    </body>"#;

    fn records() -> Vec<Modification> {
        vec![
            record("#title", ModificationKind::Text, "  New title "),
            record("#box", ModificationKind::Style, "color: red; font-weight: bold"),
            record("#rich", ModificationKind::Markup, "<b>bold</b> & <i>free"),
            record("#qty", ModificationKind::NumericFormValue, "08.0"),
            record("#gone", ModificationKind::Text, "nowhere"),
            record("#box", ModificationKind::Style, "nonsense"),
        ]
    }

    #[tokio::test]
    async fn one_pass_converges_and_the_next_writes_nothing() {
        let mut doc = Document::parse(PAGE).expect("parse");
        let mut engine = PatchEngine::new(&PatcherConfig::default());

        let first = Watcher::run_pass(&mut engine, &mut doc, &records());
        assert_eq!(first.checked, 6);
        assert_eq!(first.missing, 1);
        assert_eq!(first.rewritten, 4);

        let second = Watcher::run_pass(&mut engine, &mut doc, &records());
        assert_eq!(second.rewritten, 0);
        assert_eq!(second.missing, 1);
    }

    #[tokio::test]
    async fn drift_is_repaired() {
        let mut doc = Document::parse(PAGE).expect("parse");
        let mut engine = PatchEngine::new(&PatcherConfig::default());
        Watcher::run_pass(&mut engine, &mut doc, &records());

        let title = locate(&doc, "#title").expect("title");
        doc.set_text_content(title, "Host wrote this").expect("host write");
        let report = Watcher::run_pass(&mut engine, &mut doc, &records());
        assert_eq!(report.rewritten, 1);
        assert_eq!(doc.text_content(title), "  New title ");
    }

    fn nested() -> Vec<Modification> {
        vec![
            record("#rich", ModificationKind::Markup, "<span id=\"inner\">Hi</span> tail"),
            record("#inner", ModificationKind::Style, "color:red"),
            record("#inner", ModificationKind::Text, "Hello"),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn records_inside_a_markup_record_settle_together() {
        let mut doc = Document::parse(PAGE).expect("parse");
        let mut engine = PatchEngine::new(&PatcherConfig::default());

        let first = Watcher::run_pass(&mut engine, &mut doc, &nested());
        assert_eq!(first.rewritten, 3);
        let rich = locate(&doc, "#rich").expect("rich");
        assert_eq!(doc.text_content(rich), "Hello tail");

        let second = Watcher::run_pass(&mut engine, &mut doc, &nested());
        assert_eq!(second.rewritten, 0);

        // Highlights gone, the page is still what the records describe.
        tokio::time::advance(Duration::from_secs(5)).await;
        engine.expire_acks(&mut doc, Instant::now());
        let settled = Watcher::run_pass(&mut engine, &mut doc, &nested());
        assert_eq!(settled.rewritten, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn inner_records_listed_first_settle_on_the_next_pass() {
        let mut doc = Document::parse(PAGE).expect("parse");
        let mut engine = PatchEngine::new(&PatcherConfig::default());
        let mut records = nested();
        records.rotate_left(1);

        let first = Watcher::run_pass(&mut engine, &mut doc, &records);
        assert_eq!((first.missing, first.rewritten), (2, 1));
        let second = Watcher::run_pass(&mut engine, &mut doc, &records);
        assert_eq!((second.missing, second.rewritten), (0, 2));
        let third = Watcher::run_pass(&mut engine, &mut doc, &records);
        assert_eq!(third.rewritten, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn armed_watcher_wakes_on_structure_and_timer() {
        let mut doc = Document::parse(PAGE).expect("parse");
        let mut watcher = Watcher::new(Duration::from_secs(60));
        assert_eq!(watcher.state(), WatcherState::Disarmed);
        watcher.arm(&doc);
        assert_eq!(watcher.state(), WatcherState::Armed);

        let title = locate(&doc, "#title").expect("title");
        doc.add_class(title, "ignored").expect("class");
        doc.set_text_content(title, "changed").expect("text");
        assert_eq!(watcher.next_trigger().await, Trigger::Mutation);
        assert_eq!(watcher.next_trigger().await, Trigger::Timer);

        watcher.disarm();
        let idle = tokio::time::timeout(Duration::from_secs(600), watcher.next_trigger()).await;
        assert!(idle.is_err());
    }
}
