// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared engine fixtures for unit tests

use crate::Engine;
use tempfile::TempDir;
use wfm_core::test_support::{day, period};
use wfm_core::{
    Actor, FakeClock, Period, ProcessSpec, ProcessType, SequentialIdGen, Settings, TaskInstance,
    TemplateSpec,
};

pub(crate) type TestEngine = Engine<FakeClock, SequentialIdGen>;

pub(crate) struct Harness {
    pub engine: TestEngine,
    pub clock: FakeClock,
    pub settings: Settings,
    // Keeps the state directory alive for the test
    pub dir: TempDir,
}

pub(crate) fn alice() -> Actor {
    Actor::new("alice")
}

pub(crate) fn march() -> Period {
    period("2024-03")
}

impl Harness {
    /// Engine on 2024-03-05 with the default workflow seeded
    pub async fn new() -> Self {
        Self::with_settings(Settings::default()).await
    }

    pub async fn with_settings(settings: Settings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = FakeClock::at(day(2024, 3, 5));
        let engine = Engine::open(
            dir.path(),
            settings.clone(),
            clock.clone(),
            SequentialIdGen::new("id"),
        )
        .unwrap();
        engine.seed_default_statuses(&alice()).await.unwrap();
        Self {
            engine,
            clock,
            settings,
            dir,
        }
    }

    /// A second engine replaying the same state directory
    pub fn reopen(&self) -> TestEngine {
        Engine::open(
            self.dir.path(),
            self.settings.clone(),
            self.clock.clone(),
            SequentialIdGen::new("re"),
        )
        .unwrap()
    }

    /// Move the clock to midnight on the given day
    pub fn set_day(&self, year: i32, month: u32, d: u32) {
        self.clock.set(day(year, month, d));
    }

    /// "Monthly Report" with a Draft and a Review template
    pub async fn monthly_report(&self) -> ProcessType {
        let spec = ProcessSpec::new("Monthly Report")
            .with_guide("Compile the monthly numbers")
            .with_template(TemplateSpec::new("Draft").with_id("draft"))
            .with_template(TemplateSpec::new("Review").with_id("review"));
        self.engine
            .define_process_type(None, spec, &alice())
            .await
            .unwrap()
    }

    /// Generated instance with the given title in `period`
    pub fn instance(&self, period: Period, title: &str) -> TaskInstance {
        self.engine
            .list_instances(&crate::InstanceQuery {
                period: Some(period),
                ..Default::default()
            })
            .unwrap()
            .into_iter()
            .find(|i| i.title == title)
            .unwrap()
    }
}
