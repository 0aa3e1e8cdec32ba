//! Settings dialog window using eframe/egui.
//!
//! Renders a [`SettingsForm`] and writes it to the store on OK.

use crate::audio::EndpointVolume;
use crate::config::{ConfigStore, NumLockPolicy, VolumeMode};
use crate::settings::{InitialValueSource, SettingsForm};
use eframe::egui;
use tracing::{info, warn};

/// How the dialog was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogOutcome {
    Saved,
    Cancelled,
}

/// Settings dialog state.
pub struct SettingsDialog {
    form: SettingsForm,
    store: Box<dyn ConfigStore>,
    /// Only read, for the "current system volume" option.
    endpoint: Option<Box<dyn EndpointVolume>>,
    error_message: Option<String>,
    outcome: DialogOutcome,
}

impl SettingsDialog {
    pub fn new(
        store: Box<dyn ConfigStore>,
        endpoint: Option<Box<dyn EndpointVolume>>,
    ) -> Result<Self, crate::config::ConfigError> {
        let form = SettingsForm::open(store.as_ref())?;
        Ok(Self {
            form,
            store,
            endpoint,
            error_message: None,
            outcome: DialogOutcome::Cancelled,
        })
    }

    /// Run the dialog until it is closed.
    pub fn run(self) -> anyhow::Result<DialogOutcome> {
        let outcome = std::rc::Rc::new(std::cell::Cell::new(DialogOutcome::Cancelled));
        let result_slot = outcome.clone();

        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([420.0, 300.0])
                .with_resizable(false),
            ..Default::default()
        };

        eframe::run_native(
            SettingsForm::TITLE,
            options,
            Box::new(move |_cc| Ok(Box::new(DialogApp { dialog: self, result_slot }))),
        )
        .map_err(|e| anyhow::anyhow!("Settings dialog failed: {}", e))?;

        Ok(outcome.get())
    }

    /// Render the dialog content. Returns true when the window should close.
    fn show(&mut self, ctx: &egui::Context) -> bool {
        let mut close = false;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(SettingsForm::TITLE);
            ui.separator();

            self.num_lock_choice(ui);
            ui.add_space(6.0);
            self.volume_mode_choice(ui);
            ui.add_space(6.0);
            self.initial_value_radio(ui);
            ui.add_space(6.0);
            self.level_spinner(ui);

            if let Some(ref error) = self.error_message {
                ui.add_space(6.0);
                ui.colored_label(egui::Color32::RED, format!("Error: {}", error));
            }

            ui.add_space(12.0);
            ui.horizontal(|ui| {
                if ui.button("OK").clicked() {
                    match self.form.commit(self.store.as_ref()) {
                        Ok(settings) => {
                            info!("Settings saved from dialog: {:?}", settings);
                            self.outcome = DialogOutcome::Saved;
                            close = true;
                        }
                        Err(e) => {
                            warn!("Could not save settings: {}", e);
                            self.error_message = Some(e.to_string());
                        }
                    }
                }
                if ui.button("Cancel").clicked() {
                    self.outcome = DialogOutcome::Cancelled;
                    close = true;
                }
            });
        });

        close
    }

    fn num_lock_choice(&mut self, ui: &mut egui::Ui) {
        let mut selected = self.form.num_lock();
        egui::ComboBox::from_label(SettingsForm::NUM_LOCK_LABEL)
            .selected_text(selected.label())
            .show_ui(ui, |ui| {
                for policy in NumLockPolicy::ALL {
                    ui.selectable_value(&mut selected, policy, policy.label());
                }
            });
        if selected != self.form.num_lock() {
            self.form.select_num_lock(selected);
        }
    }

    fn volume_mode_choice(&mut self, ui: &mut egui::Ui) {
        let mut selected = self.form.volume_mode();
        egui::ComboBox::from_label(SettingsForm::VOLUME_MODE_LABEL)
            .selected_text(selected.label())
            .show_ui(ui, |ui| {
                for mode in VolumeMode::ALL {
                    ui.selectable_value(&mut selected, mode, mode.label());
                }
            });
        if selected != self.form.volume_mode() {
            self.form.select_volume_mode(selected);
        }
    }

    fn initial_value_radio(&mut self, ui: &mut egui::Ui) {
        ui.label(SettingsForm::INITIAL_VALUE_LABEL);
        let current = self.form.initial_value_source();
        for source in InitialValueSource::ALL {
            if ui.radio(current == source, source.label()).clicked() && current != source {
                self.form
                    .select_initial_value_source(source, self.endpoint.as_deref());
            }
        }
    }

    fn level_spinner(&mut self, ui: &mut egui::Ui) {
        let (min, max) = self.form.level_range();
        let mut level = self.form.level();
        ui.horizontal(|ui| {
            ui.label(SettingsForm::LEVEL_LABEL);
            ui.add_enabled(
                self.form.level_enabled(),
                egui::DragValue::new(&mut level).range(min..=max).suffix("%"),
            );
        });
        if level != self.form.level() {
            self.form.set_level(level);
        }
    }
}

struct DialogApp {
    dialog: SettingsDialog,
    result_slot: std::rc::Rc<std::cell::Cell<DialogOutcome>>,
}

impl eframe::App for DialogApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.dialog.show(ctx) {
            self.result_slot.set(self.dialog.outcome);
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }
}
