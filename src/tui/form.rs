//! Interactive filter selection form.
//!
//! Holds the toggle and parameter state behind the pipeline pane and turns it
//! into a validated selection when a run is requested. Parameter fields only
//! ever accept digits (plus one decimal point where a decimal is legal), so
//! most validation failures are impossible to type in the first place; the
//! rules that remain (kernel parity, emptiness) are enforced on run.

use crate::cli::Cli;
use crate::model::{Filter, FilterKind, ParamError, RainbowMode};

pub(super) struct FilterForm {
    /// Row under the cursor, indexing [`FilterKind::ALL`].
    pub(super) cursor: usize,
    /// Active parameter field within the cursor row.
    field: usize,
    enabled: [bool; FilterKind::ALL.len()],
    kernel: String,
    sigma: String,
    low: String,
    high: String,
    rainbow_mode: RainbowMode,
    red: String,
    green: String,
    blue: String,
}

impl Default for FilterForm {
    fn default() -> Self {
        Self {
            cursor: 0,
            field: 0,
            enabled: [false; FilterKind::ALL.len()],
            kernel: String::new(),
            sigma: String::new(),
            low: String::new(),
            high: String::new(),
            rainbow_mode: RainbowMode::Row,
            red: "255".into(),
            green: "255".into(),
            blue: "255".into(),
        }
    }
}

impl FilterForm {
    /// Seed the form from command-line flags so a prepared selection is one
    /// keypress away from running.
    pub(super) fn preload(&mut self, args: &Cli) {
        if args.gray {
            self.enable(FilterKind::Grayscale);
        }
        if args.heart {
            self.enable(FilterKind::Heart);
        }
        if args.rose {
            self.enable(FilterKind::Rose);
        }
        if let Some(raw) = &args.blur {
            self.enable(FilterKind::Blur);
            self.kernel = raw[0].clone();
            self.sigma = raw[1].clone();
        }
        if let Some(raw) = &args.edge {
            self.enable(FilterKind::Edge);
            self.low = raw[0].clone();
            self.high = raw[1].clone();
        }
        if let Some(token) = &args.rainbow {
            self.enable(FilterKind::Rainbow);
            if token.trim() == "c" {
                self.rainbow_mode = RainbowMode::Column;
            }
        }
        if let Some(raw) = &args.singlecolour {
            self.enable(FilterKind::SingleColour);
            self.red = raw[0].clone();
            self.green = raw[1].clone();
            self.blue = raw[2].clone();
        }
    }

    pub(super) fn active_kind(&self) -> FilterKind {
        FilterKind::ALL[self.cursor]
    }

    pub(super) fn is_enabled(&self, kind: FilterKind) -> bool {
        self.enabled[kind as usize]
    }

    pub(super) fn move_cursor(&mut self, down: bool) {
        if down {
            if self.cursor + 1 < FilterKind::ALL.len() {
                self.cursor += 1;
            }
        } else if self.cursor > 0 {
            self.cursor -= 1;
        }
        self.field = 0;
    }

    pub(super) fn toggle(&mut self) {
        self.enabled[self.cursor] = !self.enabled[self.cursor];
    }

    pub(super) fn field_right(&mut self) {
        match self.active_kind() {
            FilterKind::Rainbow => self.cycle_rainbow(),
            kind => {
                let n = field_count(kind);
                if n > 0 {
                    self.field = (self.field + 1) % n;
                }
            }
        }
    }

    pub(super) fn field_left(&mut self) {
        match self.active_kind() {
            FilterKind::Rainbow => self.cycle_rainbow(),
            kind => {
                let n = field_count(kind);
                if n > 0 {
                    self.field = (self.field + n - 1) % n;
                }
            }
        }
    }

    /// Feed one typed character into the active parameter field. Returns
    /// whether the character was accepted; anything but a digit (or a first
    /// decimal point in a decimal field) is dropped.
    pub(super) fn input_char(&mut self, c: char) -> bool {
        let Some((text, decimal_ok)) = self.active_field_mut() else {
            return false;
        };
        if c.is_ascii_digit() {
            text.push(c);
            true
        } else if c == '.' && decimal_ok && !text.contains('.') {
            text.push(c);
            true
        } else {
            false
        }
    }

    pub(super) fn backspace(&mut self) -> bool {
        match self.active_field_mut() {
            Some((text, _)) => text.pop().is_some(),
            None => false,
        }
    }

    /// Validate and build the selection for a run request, in row order.
    pub(super) fn selection(&self) -> Result<Vec<Filter>, ParamError> {
        let mut filters = Vec::new();
        for kind in FilterKind::ALL {
            if !self.enabled[kind as usize] {
                continue;
            }
            filters.push(match kind {
                FilterKind::Grayscale => Filter::Grayscale,
                FilterKind::Heart => Filter::Heart,
                FilterKind::Rose => Filter::Rose,
                FilterKind::Blur => Filter::parse_blur(&self.kernel, &self.sigma)?,
                FilterKind::Edge => Filter::parse_edge(&self.low, &self.high)?,
                FilterKind::Rainbow => Filter::Rainbow {
                    mode: self.rainbow_mode,
                },
                FilterKind::SingleColour => {
                    Filter::parse_single_colour(&self.red, &self.green, &self.blue)?
                }
            });
        }
        Ok(filters)
    }

    /// Parameter fields of a row for rendering: label, current text, and
    /// whether the field is the active edit target.
    pub(super) fn param_fields(&self, kind: FilterKind) -> Vec<(&'static str, String, bool)> {
        let on_row = self.active_kind() == kind;
        let active = |i: usize| on_row && self.field == i;
        match kind {
            FilterKind::Blur => vec![
                ("kernel", self.kernel.clone(), active(0)),
                ("sigma", self.sigma.clone(), active(1)),
            ],
            FilterKind::Edge => vec![
                ("low", self.low.clone(), active(0)),
                ("high", self.high.clone(), active(1)),
            ],
            FilterKind::Rainbow => {
                let mode = match self.rainbow_mode {
                    RainbowMode::Row => "row",
                    RainbowMode::Column => "column",
                };
                vec![("mode", mode.to_string(), on_row)]
            }
            FilterKind::SingleColour => vec![
                ("r", self.red.clone(), active(0)),
                ("g", self.green.clone(), active(1)),
                ("b", self.blue.clone(), active(2)),
            ],
            _ => Vec::new(),
        }
    }

    fn enable(&mut self, kind: FilterKind) {
        self.enabled[kind as usize] = true;
    }

    fn cycle_rainbow(&mut self) {
        self.rainbow_mode = match self.rainbow_mode {
            RainbowMode::Row => RainbowMode::Column,
            RainbowMode::Column => RainbowMode::Row,
        };
    }

    fn active_field_mut(&mut self) -> Option<(&mut String, bool)> {
        match (self.active_kind(), self.field) {
            (FilterKind::Blur, 0) => Some((&mut self.kernel, false)),
            (FilterKind::Blur, 1) => Some((&mut self.sigma, true)),
            (FilterKind::Edge, 0) => Some((&mut self.low, true)),
            (FilterKind::Edge, 1) => Some((&mut self.high, true)),
            (FilterKind::SingleColour, 0) => Some((&mut self.red, false)),
            (FilterKind::SingleColour, 1) => Some((&mut self.green, false)),
            (FilterKind::SingleColour, 2) => Some((&mut self.blue, false)),
            _ => None,
        }
    }
}

fn field_count(kind: FilterKind) -> usize {
    match kind {
        FilterKind::Blur | FilterKind::Edge => 2,
        FilterKind::SingleColour => 3,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cursor_to(form: &mut FilterForm, kind: FilterKind) {
        while form.active_kind() != kind {
            form.move_cursor(true);
        }
    }

    #[test]
    fn empty_form_yields_empty_selection() {
        assert!(FilterForm::default().selection().unwrap().is_empty());
    }

    #[test]
    fn toggled_rows_build_the_selection_in_row_order() {
        let mut form = FilterForm::default();
        cursor_to(&mut form, FilterKind::Rainbow);
        form.toggle();
        while form.active_kind() != FilterKind::Grayscale {
            form.move_cursor(false);
        }
        form.toggle();

        assert_eq!(
            form.selection().unwrap(),
            vec![
                Filter::Grayscale,
                Filter::Rainbow {
                    mode: RainbowMode::Row
                }
            ]
        );
    }

    #[test]
    fn blur_row_requires_valid_parameters() {
        let mut form = FilterForm::default();
        cursor_to(&mut form, FilterKind::Blur);
        form.toggle();
        assert!(form.selection().is_err(), "empty kernel should not validate");

        assert!(form.input_char('4'));
        assert!(form.selection().is_err(), "even kernel should not validate");

        form.backspace();
        assert!(form.input_char('5'));
        form.field_right();
        assert!(form.input_char('2'));
        assert!(form.input_char('.'));
        assert!(form.input_char('0'));
        assert_eq!(
            form.selection().unwrap(),
            vec![Filter::Blur {
                kernel: 5,
                sigma: 2.0
            }]
        );
    }

    #[test]
    fn non_numeric_keystrokes_are_dropped() {
        let mut form = FilterForm::default();
        cursor_to(&mut form, FilterKind::Blur);
        assert!(!form.input_char('a'));
        assert!(!form.input_char('-'));
        assert!(!form.input_char('.'), "kernel is an integer field");
        assert!(form.input_char('7'));
    }

    #[test]
    fn decimal_fields_accept_one_point_only() {
        let mut form = FilterForm::default();
        cursor_to(&mut form, FilterKind::Edge);
        assert!(form.input_char('1'));
        assert!(form.input_char('.'));
        assert!(!form.input_char('.'));
        assert_eq!(form.param_fields(FilterKind::Edge)[0].1, "1.");
    }

    #[test]
    fn rainbow_mode_cycles_with_field_keys() {
        let mut form = FilterForm::default();
        cursor_to(&mut form, FilterKind::Rainbow);
        form.toggle();
        form.field_right();
        assert_eq!(
            form.selection().unwrap(),
            vec![Filter::Rainbow {
                mode: RainbowMode::Column
            }]
        );
        form.field_left();
        assert_eq!(
            form.selection().unwrap(),
            vec![Filter::Rainbow {
                mode: RainbowMode::Row
            }]
        );
    }

    #[test]
    fn colour_defaults_to_white() {
        let mut form = FilterForm::default();
        cursor_to(&mut form, FilterKind::SingleColour);
        form.toggle();
        assert_eq!(
            form.selection().unwrap(),
            vec![Filter::SingleColour {
                red: 255,
                green: 255,
                blue: 255
            }]
        );
    }

    #[test]
    fn preload_mirrors_command_line_flags() {
        let args = Cli::parse_from([
            "filterpipe",
            "--gray",
            "--blur",
            "9",
            "1.5",
            "--rainbow",
            "c",
        ]);
        let mut form = FilterForm::default();
        form.preload(&args);

        assert!(form.is_enabled(FilterKind::Grayscale));
        assert!(form.is_enabled(FilterKind::Blur));
        assert!(form.is_enabled(FilterKind::Rainbow));
        assert!(!form.is_enabled(FilterKind::Heart));
        assert_eq!(
            form.selection().unwrap(),
            vec![
                Filter::Grayscale,
                Filter::Blur {
                    kernel: 9,
                    sigma: 1.5
                },
                Filter::Rainbow {
                    mode: RainbowMode::Column
                }
            ]
        );
    }
}
