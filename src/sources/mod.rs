// SPDX-License-Identifier: Apache-2.0

pub mod file;

use opentelemetry::global;
use opentelemetry::metrics::Meter;

pub fn get_meter() -> Meter {
    global::meter("sources")
}
