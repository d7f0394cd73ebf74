//! Writes stored values into the page.

use std::collections::HashMap;

use anyhow::Error;
use html::{Document, DomEvent, NodeId};
use tokio::time::{Duration, Instant};

use crate::classify::{self, ModificationKind, is_numeric_control, parse_style_pair};
use crate::config::{ENGINE_CLASSES, PatcherConfig};
use crate::selector::locate;
use crate::store::Modification;

const ACK_PROPERTY: &str = "background-color";

/// Transient highlight on a freshly written element.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PendingAck {
    /// Inline `background-color` to restore; `None` removes the property.
    prior: Option<String>,
    deadline: Instant,
}

/// Canonical string form of a numeric value; unparsable or non-finite input is `0`.
pub fn canonical_number(value: &str) -> String {
    match value.trim().parse::<f64>() {
        Ok(number) if number.is_finite() => {
            // `-0` and `0` are the same value.
            if number == 0.0 {
                "0".to_owned()
            } else {
                number.to_string()
            }
        }
        _ => {
            log::debug!(target: "patcher", "NumericParseFailure: {value:?}, using 0");
            "0".to_owned()
        }
    }
}

#[derive(Debug)]
pub struct PatchEngine {
    highlight_color: String,
    ack_duration: Duration,
    acks: HashMap<NodeId, PendingAck>,
}

impl PatchEngine {
    pub fn new(config: &PatcherConfig) -> Self {
        Self {
            highlight_color: config.highlight_color.clone(),
            ack_duration: config.ack_duration(),
            acks: HashMap::new(),
        }
    }

    /// Apply to whatever `selector` currently names. Missing targets are `false`.
    pub fn apply_selector(
        &mut self,
        doc: &mut Document,
        selector: &str,
        kind: ModificationKind,
        value: &str,
    ) -> bool {
        let Some(node) = locate(doc, selector) else {
            log::debug!(target: "patcher", "TargetNotFound: {selector:?}");
            return false;
        };
        self.apply(doc, node, kind, value)
    }

    /// Write `value` into `node` and acknowledge it. Returns whether anything was written.
    pub fn apply(
        &mut self,
        doc: &mut Document,
        node: NodeId,
        kind: ModificationKind,
        value: &str,
    ) -> bool {
        match self.write(doc, node, kind, value) {
            Ok(true) => {
                self.acknowledge(doc, node);
                true
            }
            Ok(false) => false,
            Err(err) => {
                log::debug!(target: "patcher", "apply {kind:?} failed: {err:#}");
                false
            }
        }
    }

    fn write(
        &mut self,
        doc: &mut Document,
        node: NodeId,
        kind: ModificationKind,
        value: &str,
    ) -> Result<bool, Error> {
        match kind {
            ModificationKind::Text => doc.set_text_content(node, value)?,
            ModificationKind::Markup => doc.set_inner_html(node, value)?,
            ModificationKind::FormValue if doc.is_form_control(node) => {
                set_control(doc, node, value)?;
            }
            ModificationKind::NumericFormValue if is_numeric_control(doc, node) => {
                set_control(doc, node, &canonical_number(value))?;
            }
            ModificationKind::FormValue | ModificationKind::NumericFormValue => {
                doc.set_text_content(node, value)?;
            }
            ModificationKind::Style => {
                let Some((property, declared)) = parse_style_pair(value) else {
                    log::debug!(target: "patcher", "MalformedStyleValue: {value:?}");
                    return Ok(false);
                };
                match self.acks.get_mut(&node) {
                    // The highlight owns the inline value until it expires.
                    Some(ack) if property == ACK_PROPERTY => ack.prior = Some(declared),
                    _ => doc.set_style_property(node, &property, &declared)?,
                }
            }
        }
        Ok(true)
    }

    fn acknowledge(&mut self, doc: &mut Document, node: NodeId) {
        let deadline = Instant::now() + self.ack_duration;
        if let Some(ack) = self.acks.get_mut(&node) {
            ack.deadline = deadline;
            return;
        }
        let prior = doc.style_property(node, ACK_PROPERTY);
        if let Err(err) = doc.set_style_property(node, ACK_PROPERTY, &self.highlight_color) {
            log::debug!(target: "patcher", "acknowledgment skipped: {err:#}");
            return;
        }
        self.acks.insert(node, PendingAck { prior, deadline });
    }

    /// What `apply(node, kind, value)` leaves behind, in the terms of
    /// [`classify::current_value`]. `None` when the value can never drift.
    ///
    /// A `Markup` target also carries every record in `others` whose target
    /// lies inside `node`, since re-applying those is part of settling.
    pub fn effective_target(
        doc: &Document,
        node: NodeId,
        kind: ModificationKind,
        value: &str,
        others: &[Modification],
    ) -> Option<String> {
        match kind {
            ModificationKind::Text => Some(value.trim().to_owned()),
            ModificationKind::Markup => markup_target(doc, node, value, others),
            ModificationKind::FormValue if doc.is_form_control(node) => Some(value.to_owned()),
            ModificationKind::NumericFormValue if is_numeric_control(doc, node) => {
                Some(canonical_number(value))
            }
            ModificationKind::FormValue | ModificationKind::NumericFormValue => {
                Some(value.trim().to_owned())
            }
            ModificationKind::Style => {
                let (property, declared) = parse_style_pair(value)?;
                let written = css_style_attr::set_property("", &property, &declared);
                css_style_attr::get_property(&written, &property)
            }
        }
    }

    /// Live value, seen through pending acknowledgments and without engine classes.
    pub fn current_value(
        &self,
        doc: &Document,
        node: NodeId,
        kind: ModificationKind,
        value: &str,
    ) -> Option<String> {
        match kind {
            ModificationKind::Markup => {
                doc.node(node)?;
                Some(self.live_markup(doc, node))
            }
            ModificationKind::Style => match self.acks.get(&node) {
                Some(ack)
                    if parse_style_pair(value)
                        .is_some_and(|(property, _)| property == ACK_PROPERTY) =>
                {
                    ack.prior.clone()
                }
                _ => classify::current_value(doc, node, kind, value),
            },
            _ => classify::current_value(doc, node, kind, value),
        }
    }

    fn live_markup(&self, doc: &Document, node: NodeId) -> String {
        doc.inner_html_filtered(node, &|element, name, value| match self.acks.get(&element) {
            Some(ack) if name == "style" => {
                let unhighlighted = match &ack.prior {
                    Some(prior) => css_style_attr::set_property(value, ACK_PROPERTY, prior),
                    None => css_style_attr::remove_property(value, ACK_PROPERTY),
                };
                normalize_attr(name, &unhighlighted)
            }
            _ => normalize_attr(name, value),
        })
    }

    /// True when the live value differs from what applying `value` and the
    /// records nested under it would leave.
    pub fn has_drifted(
        &self,
        doc: &Document,
        node: NodeId,
        kind: ModificationKind,
        value: &str,
        others: &[Modification],
    ) -> bool {
        let Some(target) = Self::effective_target(doc, node, kind, value, others) else {
            return false;
        };
        self.current_value(doc, node, kind, value).as_deref() != Some(target.as_str())
    }

    pub fn is_acknowledging(&self, node: NodeId) -> bool {
        self.acks.contains_key(&node)
    }

    pub fn next_ack_deadline(&self) -> Option<Instant> {
        self.acks.values().map(|ack| ack.deadline).min()
    }

    /// Revert every acknowledgment due at `now`. Returns how many were reverted.
    pub fn expire_acks(&mut self, doc: &mut Document, now: Instant) -> usize {
        let due: Vec<NodeId> = self
            .acks
            .iter()
            .filter(|(_, ack)| ack.deadline <= now)
            .map(|(node, _)| *node)
            .collect();
        for node in &due {
            if let Some(ack) = self.acks.remove(node) {
                revert(doc, *node, ack.prior.as_deref());
            }
        }
        due.len()
    }

    /// Revert all acknowledgments immediately.
    pub fn clear_acks(&mut self, doc: &mut Document) {
        for (node, ack) in self.acks.drain() {
            revert(doc, node, ack.prior.as_deref());
        }
    }
}

fn revert(doc: &mut Document, node: NodeId, prior: Option<&str>) {
    if !doc.is_connected(node) {
        return;
    }
    let reverted = match prior {
        Some(value) => doc.set_style_property(node, ACK_PROPERTY, value),
        None => doc.remove_style_property(node, ACK_PROPERTY),
    };
    if let Err(err) = reverted {
        log::debug!(target: "patcher", "acknowledgment revert failed: {err:#}");
    }
}

/// Compare-form of an attribute: engine classes dropped, declarations
/// re-serialized, empty results removed.
fn normalize_attr(name: &str, value: &str) -> Option<String> {
    let normalized = match name {
        "class" => value
            .split_ascii_whitespace()
            .filter(|class| !ENGINE_CLASSES.contains(class))
            .collect::<Vec<_>>()
            .join(" "),
        "style" => css_style_attr::serialize_declarations(&css_style_attr::parse_style_attribute(value)),
        _ => return Some(value.to_owned()),
    };
    (!normalized.is_empty()).then_some(normalized)
}

/// `value` parsed under `node`, with the records nested inside `node`
/// written into the parsed copy outermost first.
fn markup_target(
    doc: &Document,
    node: NodeId,
    value: &str,
    others: &[Modification],
) -> Option<String> {
    let context = doc.tag_name(node)?;
    let (mut scratch, holder) = match Document::parse_fragment(context, value) {
        Ok(parsed) => parsed,
        Err(err) => {
            log::debug!(target: "patcher", "markup target unparsable: {err:#}");
            return None;
        }
    };
    let mut nested: Vec<(Vec<NodeId>, &Modification)> = others
        .iter()
        .filter_map(|other| {
            let target = locate(doc, &other.selector)?;
            Some((descent(doc, node, target)?, other))
        })
        .collect();
    nested.sort_by_key(|(chain, _)| chain.len());
    for (chain, other) in nested {
        let Some(twin) = counterpart(doc, node, &chain, &scratch, holder) else {
            continue;
        };
        if let Err(err) = overlay(&mut scratch, twin, other) {
            log::debug!(target: "patcher", "nested {:?} not modelled: {err:#}", other.selector);
        }
    }
    Some(scratch.inner_html_filtered(holder, &|_, name, attr| normalize_attr(name, attr)))
}

/// Elements from just below `ancestor` down to `target`. `None` unless
/// `target` is a strict descendant.
fn descent(doc: &Document, ancestor: NodeId, target: NodeId) -> Option<Vec<NodeId>> {
    let mut chain = Vec::new();
    let mut current = target;
    while current != ancestor {
        chain.push(current);
        current = doc.parent_element(current)?;
    }
    chain.reverse();
    (!chain.is_empty()).then_some(chain)
}

/// The element of `scratch` at the position `chain` takes below `live_root`.
/// Tags must agree at every step.
fn counterpart(
    doc: &Document,
    live_root: NodeId,
    chain: &[NodeId],
    scratch: &Document,
    holder: NodeId,
) -> Option<NodeId> {
    let mut live_parent = live_root;
    let mut twin = holder;
    for step in chain {
        let index = doc
            .element_children(live_parent)
            .iter()
            .position(|child| child == step)?;
        let candidate = *scratch.element_children(twin).get(index)?;
        if scratch.tag_name(candidate) != doc.tag_name(*step) {
            return None;
        }
        live_parent = *step;
        twin = candidate;
    }
    Some(twin)
}

/// Write `record` into a scratch copy. Control values are state, not markup.
fn overlay(scratch: &mut Document, twin: NodeId, record: &Modification) -> Result<(), Error> {
    match record.kind {
        ModificationKind::Text => scratch.set_text_content(twin, &record.value)?,
        ModificationKind::Markup => scratch.set_inner_html(twin, &record.value)?,
        ModificationKind::FormValue if scratch.is_form_control(twin) => {}
        ModificationKind::NumericFormValue if is_numeric_control(scratch, twin) => {}
        ModificationKind::FormValue | ModificationKind::NumericFormValue => {
            scratch.set_text_content(twin, &record.value)?;
        }
        ModificationKind::Style => {
            if let Some((property, declared)) = parse_style_pair(&record.value) {
                scratch.set_style_property(twin, &property, &declared)?;
            }
        }
    }
    Ok(())
}

/// Set a control's value and fire the events a user edit would.
fn set_control(doc: &mut Document, node: NodeId, value: &str) -> Result<(), Error> {
    doc.set_control_value(node, value)?;
    doc.dispatch_event(DomEvent::Input { target: node });
    doc.dispatch_event(DomEvent::Change { target: node });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<body>
        <h1 id="title">Old</h1>
        <div id="box" style="color: blue; margin: 0">box</div>
        <input id="name" value="a">
        <input id="qty" type="number" value="1">
        <p id="para">text</p>
        <table><tbody id="rows"><tr><td>old</td></tr></tbody></table>
    </body>"#;

    fn setup() -> (Document, PatchEngine) {
        let doc = Document::parse(PAGE).expect("parse");
        (doc, PatchEngine::new(&PatcherConfig::default()))
    }

    fn node(doc: &Document, selector: &str) -> NodeId {
        locate(doc, selector).expect("present")
    }

    fn record(selector: &str, kind: ModificationKind, value: &str) -> Modification {
        Modification {
            selector: selector.to_owned(),
            kind,
            value: value.to_owned(),
            applied_at: 0,
        }
    }

    #[test]
    fn numbers_are_canonical() {
        assert_eq!(canonical_number("42"), "42");
        assert_eq!(canonical_number(" 3.50 "), "3.5");
        assert_eq!(canonical_number("-0"), "0");
        assert_eq!(canonical_number("abc"), "0");
        assert_eq!(canonical_number("NaN"), "0");
        assert_eq!(canonical_number(""), "0");
    }

    #[tokio::test]
    async fn text_is_literal_and_idempotent() {
        let (mut doc, mut engine) = setup();
        let title = node(&doc, "#title");
        assert!(engine.apply(&mut doc, title, ModificationKind::Text, "<b>New</b>"));
        let once = doc.inner_html(title);
        assert!(engine.apply(&mut doc, title, ModificationKind::Text, "<b>New</b>"));
        assert_eq!(doc.inner_html(title), once);
        assert_eq!(doc.text_content(title), "<b>New</b>");
        assert!(!engine.has_drifted(&doc, title, ModificationKind::Text, "<b>New</b>", &[]));
    }

    #[tokio::test]
    async fn markup_reaches_a_fixed_point() {
        let (mut doc, mut engine) = setup();
        let para = node(&doc, "#para");
        let value = "<em>rich</em> <p>unclosed";
        assert!(engine.has_drifted(&doc, para, ModificationKind::Markup, value, &[]));
        assert!(engine.apply(&mut doc, para, ModificationKind::Markup, value));
        assert!(!engine.has_drifted(&doc, para, ModificationKind::Markup, value, &[]));
    }

    #[tokio::test]
    async fn table_rows_survive_markup() {
        let (mut doc, mut engine) = setup();
        let rows = node(&doc, "#rows");
        let value = "<tr><td>a</td></tr><tr><td>b</td></tr>";
        assert!(engine.apply(&mut doc, rows, ModificationKind::Markup, value));
        assert_eq!(doc.inner_html(rows), value);
        assert!(!engine.has_drifted(&doc, rows, ModificationKind::Markup, value, &[]));
    }

    #[tokio::test(start_paused = true)]
    async fn markup_target_includes_nested_records() {
        let (mut doc, mut engine) = setup();
        let para = node(&doc, "#para");
        let records = [
            record("#para", ModificationKind::Markup, "<span id=\"inner\">Hi</span>"),
            record("#inner", ModificationKind::Style, "color:red"),
        ];
        let markup = records[0].value.as_str();
        assert!(engine.apply(&mut doc, para, ModificationKind::Markup, markup));
        let inner = node(&doc, "#inner");
        assert!(engine.apply(&mut doc, inner, ModificationKind::Style, "color:red"));
        assert!(engine.is_acknowledging(inner));

        assert!(!engine.has_drifted(&doc, para, ModificationKind::Markup, markup, &records));
        // On its own the container sees the styled child as foreign.
        assert!(engine.has_drifted(&doc, para, ModificationKind::Markup, markup, &records[..1]));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(engine.expire_acks(&mut doc, Instant::now()), 2);
        assert!(!engine.has_drifted(&doc, para, ModificationKind::Markup, markup, &records));

        doc.set_text_content(inner, "Bye").expect("host write");
        assert!(engine.has_drifted(&doc, para, ModificationKind::Markup, markup, &records));
    }

    #[test]
    fn engine_classes_are_not_drift() {
        use crate::config::HOVER_CLASS;

        let (mut doc, engine) = setup();
        let para = node(&doc, "#para");
        doc.set_inner_html(para, "<b class=\"x\">bold</b>").expect("markup");
        let bold = locate(&doc, "#para b").expect("bold");
        doc.add_class(bold, HOVER_CLASS).expect("class");
        let value = "<b class=\"x\">bold</b>";
        assert!(!engine.has_drifted(&doc, para, ModificationKind::Markup, value, &[]));
    }

    #[tokio::test]
    async fn style_sets_one_property() {
        let (mut doc, mut engine) = setup();
        let target = node(&doc, "#box");
        assert!(engine.apply(&mut doc, target, ModificationKind::Style, "color:red"));
        assert_eq!(doc.style_property(target, "color").as_deref(), Some("red"));
        assert_eq!(doc.style_property(target, "margin").as_deref(), Some("0"));
        assert!(!engine.has_drifted(&doc, target, ModificationKind::Style, "color:red", &[]));

        let before = doc.attr(target, "style").map(str::to_owned);
        assert!(!engine.apply(&mut doc, target, ModificationKind::Style, "not-a-valid-pair"));
        assert_eq!(doc.attr(target, "style").map(str::to_owned), before);
        assert!(!engine.has_drifted(&doc, target, ModificationKind::Style, "not-a-valid-pair", &[]));
    }

    #[tokio::test]
    async fn form_values_fire_input_and_change() {
        let (mut doc, mut engine) = setup();
        let name = node(&doc, "#name");
        let mut events = doc.subscribe_events();
        assert!(engine.apply(&mut doc, name, ModificationKind::FormValue, "typed"));
        assert_eq!(doc.control_value(name).as_deref(), Some("typed"));
        assert_eq!(events.try_recv().expect("input"), DomEvent::Input { target: name });
        assert_eq!(events.try_recv().expect("change"), DomEvent::Change { target: name });
    }

    #[tokio::test]
    async fn numeric_values_default_and_degrade() {
        let (mut doc, mut engine) = setup();
        let qty = node(&doc, "#qty");
        assert!(engine.apply(&mut doc, qty, ModificationKind::NumericFormValue, "oops"));
        assert_eq!(doc.control_value(qty).as_deref(), Some("0"));
        assert!(engine.apply(&mut doc, qty, ModificationKind::NumericFormValue, "7.50"));
        assert_eq!(doc.control_value(qty).as_deref(), Some("7.5"));
        assert!(!engine.has_drifted(&doc, qty, ModificationKind::NumericFormValue, "7.50", &[]));

        let para = node(&doc, "#para");
        assert!(engine.apply(&mut doc, para, ModificationKind::NumericFormValue, "12"));
        assert_eq!(doc.text_content(para), "12");
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledgment_reverts_to_prior_value() {
        let (mut doc, mut engine) = setup();
        let title = node(&doc, "#title");
        doc.set_style_property(title, "background-color", "white").expect("style");
        assert!(engine.apply(&mut doc, title, ModificationKind::Text, "New"));
        assert_eq!(doc.style_property(title, "background-color").as_deref(), Some("#fff3a0"));

        // A second write while highlighted only extends the deadline.
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(engine.apply(&mut doc, title, ModificationKind::Text, "Newer"));
        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(engine.expire_acks(&mut doc, Instant::now()), 0);
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(engine.expire_acks(&mut doc, Instant::now()), 1);
        assert_eq!(doc.style_property(title, "background-color").as_deref(), Some("white"));
        assert!(engine.next_ack_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn background_style_during_acknowledgment_lands_after_revert() {
        let (mut doc, mut engine) = setup();
        let target = node(&doc, "#box");
        let value = "background-color: green";
        assert!(engine.apply(&mut doc, target, ModificationKind::Style, value));
        // The highlight is showing, but the comparison sees the saved value.
        assert!(engine.is_acknowledging(target));
        assert!(!engine.has_drifted(&doc, target, ModificationKind::Style, value, &[]));

        tokio::time::advance(Duration::from_secs(2)).await;
        engine.expire_acks(&mut doc, Instant::now());
        assert_eq!(doc.style_property(target, "background-color").as_deref(), Some("green"));
        assert!(!engine.has_drifted(&doc, target, ModificationKind::Style, value, &[]));
    }

    #[test]
    fn missing_targets_are_false() {
        let (mut doc, mut engine) = setup();
        assert!(!engine.apply_selector(&mut doc, "#nope", ModificationKind::Text, "x"));
        assert!(!engine.apply_selector(&mut doc, "[[", ModificationKind::Text, "x"));
    }
}
