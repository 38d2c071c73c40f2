//! PlantUML rendering of a transition table.

use crate::machine::{StateMachine, TransitionDef};
use std::fmt;

const INITIAL_STATE: &str = "[*]";
const FINAL_STATE: &str = "[*]";
const DEFAULT_ARROW: &str = "-->";

const SKIN: &[&str] = &[
    "hide empty description",
    "",
    "skinparam shadowing            true",
    "skinparam ArrowFontColor       #bbb",
    "skinparam ArrowFontStyle       italic",
    "skinparam ArrowColor           blue",
    "skinparam ArrowThickness       0.3",
    "skinparam StateFontColor       blue",
    "skinparam StateBackgroundColor lightblue",
    "skinparam StateBorderColor     blue",
    "skinparam StateBorderThickness 2",
];

impl<S, C> StateMachine<S, C>
where
    S: Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static,
    C: Send,
{
    /// Render the machine as a PlantUML state diagram.
    ///
    /// The current state is drawn as the initial state. Arrows into final
    /// states are dotted; arrows with an action are thick, goto arrows
    /// medium. With `include_final = false` final states are left out.
    pub fn to_plant_uml(&self, title: Option<&str>, include_final: bool) -> String {
        let mut states: Vec<S> = Vec::new();
        for state in self
            .rows()
            .iter()
            .map(|row| &row.from)
            .chain(self.rows().iter().map(|row| &row.to))
        {
            if !states.contains(state) {
                states.push(state.clone());
            }
        }

        // Rows grouped by source state, in order of first appearance.
        let mut rows: Vec<&TransitionDef<S, C>> = Vec::new();
        for from in states.iter() {
            rows.extend(self.rows().iter().filter(|row| &row.from == from));
        }

        let mut finals: Vec<S> = states.iter().filter(|s| self.is_final(s)).cloned().collect();
        if !include_final {
            states.retain(|s| !finals.contains(s));
            rows.retain(|row| !finals.contains(&row.to));
            finals.clear();
        }

        let arrow = |to: &S, row: Option<&TransitionDef<S, C>>| -> String {
            let mut modifiers: Vec<&str> = Vec::new();
            if finals.contains(to) {
                modifiers.push("dotted");
            }
            if let Some(action) = row.and_then(|row| row.action.as_ref()) {
                modifiers.push(if action.is_goto() {
                    "thickness=2"
                } else {
                    "thickness=5"
                });
            }
            if modifiers.is_empty() {
                DEFAULT_ARROW.to_string()
            } else {
                format!("-[{}]->", modifiers.join(","))
            }
        };

        let state_width = states.iter().map(|s| quote(s).len()).max().unwrap_or(0);
        let from_width = rows
            .iter()
            .map(|row| short(&row.from).len())
            .chain(std::iter::once(INITIAL_STATE.len()))
            .max()
            .unwrap_or(0);
        let arrow_width = rows
            .iter()
            .map(|row| arrow(&row.to, Some(row)).len())
            .chain(finals.iter().map(|s| arrow(s, None).len()))
            .max()
            .unwrap_or(0);
        let to_width = rows
            .iter()
            .map(|row| short(&row.to).len())
            .max()
            .unwrap_or(0);

        let mut lines: Vec<String> = vec!["@startuml".to_string()];
        lines.extend(SKIN.iter().map(|line| line.to_string()));
        lines.push(String::new());
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            lines.push(format!("title {}", quote(title)));
        }
        lines.push(String::new());
        for state in &states {
            lines.push(format!(
                "state {:<width$} as {}",
                quote(state),
                short(state),
                width = state_width
            ));
        }
        lines.push(String::new());
        lines.push(format!(
            "{:<fw$} {:<aw$} {}",
            INITIAL_STATE,
            DEFAULT_ARROW,
            short(self.state()),
            fw = from_width,
            aw = arrow_width
        ));
        for row in &rows {
            lines.push(format!(
                "{:<fw$} {:<aw$} {:<tw$} {}",
                short(&row.from),
                arrow(&row.to, Some(row)),
                short(&row.to),
                self.note(row),
                fw = from_width,
                aw = arrow_width,
                tw = to_width
            ));
        }
        for state in &finals {
            lines.push(format!(
                "{:<fw$} {:<aw$} {}",
                short(state),
                arrow(state, None),
                FINAL_STATE,
                fw = from_width,
                aw = arrow_width
            ));
        }
        lines.push("@enduml".to_string());

        lines
            .iter()
            .map(|line| line.trim())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `: text` for a row, from its description or else its action name.
    fn note(&self, row: &TransitionDef<S, C>) -> String {
        let text = match (&row.description, &row.action) {
            (Some(description), _) if !description.is_empty() => {
                self.cleanup(&description.replace('"', "'"), &row.to)
            }
            (_, Some(action)) if !action.name().is_empty() => {
                self.cleanup(&uncamel(action.name()), &row.to)
            }
            _ => String::new(),
        };
        if text.is_empty() || text == row.to.to_string() {
            String::new()
        } else {
            format!(": {text}")
        }
    }

    /// Shorten a note: drop the obvious follow-up state and dangling arrows.
    fn cleanup(&self, text: &str, to: &S) -> String {
        let mut text = text
            .trim()
            .replace(", and ", ", ")
            .replace(" and ", ", ");
        if text.starts_with("goto ") {
            text = text.replacen("goto ", " → ", 1);
        }
        text = text.replace(" goto ", "  → ");

        let onward: Vec<S> = self
            .available_transitions(to)
            .into_iter()
            .filter(|s| !self.is_final(s))
            .collect();
        if let [only] = onward.as_slice() {
            text = text.replacen(&only.to_string(), "", 1);
        }

        let text = text.trim();
        let text = text.strip_suffix('→').unwrap_or(text);
        text.trim().to_string()
    }
}

fn short<S: fmt::Display>(state: &S) -> String {
    state.to_string().replace(' ', "_")
}

fn quote<S: fmt::Display + ?Sized>(value: &S) -> String {
    format!("\"{}\"", value.to_string().replace('\n', "\\n"))
}

/// `startListening` or `start_listening` to `start listening`.
fn uncamel(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c == '_' {
            out.push(' ');
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower {
            out.push(' ');
        }
        prev_lower = c.is_ascii_lowercase();
        out.push(c.to_ascii_lowercase());
    }
    out
}
