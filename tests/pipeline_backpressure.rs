// Copyright (c) 2026 Tributary
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

use crossbeam_channel::bounded;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tributary::core::config::PipelineConfig;
use tributary::core::virtualmap::{MemoryDataSource, VirtualMap, VirtualPipeline};

#[test]
fn sixth_flush_marked_copy_blocks_quadratically() {
    let config = PipelineConfig {
        preferred_queue_size: 2,
        backpressure_step_ms: 5,
        max_backpressure_ms: 200,
    };
    let pipeline = VirtualPipeline::new(config, None);
    let map = VirtualMap::new(Arc::new(MemoryDataSource::new()));

    // Park the worker behind a detach barrier so nothing drains.
    let parked = map.fast_copy();
    pipeline.register_copy(parked.clone()).unwrap();
    let (entered_tx, entered_rx) = bounded::<()>(1);
    let (resume_tx, resume_rx) = bounded::<()>(1);
    let barrier_pipeline = &pipeline;
    std::thread::scope(|scope| {
        scope.spawn(move || {
            barrier_pipeline
                .detach_copy(&parked, |copy| {
                    copy.detach();
                    let _ = entered_tx.send(());
                    let _ = resume_rx.recv();
                })
                .unwrap();
        });
        entered_rx.recv().unwrap();

        // Six flush-marked registrations against preferred_queue_size = 2.
        let mut elapsed = Vec::new();
        for _ in 0..6 {
            let copy = map.fast_copy();
            copy.set_should_flush(true);
            let started = Instant::now();
            pipeline.register_copy(copy).unwrap();
            elapsed.push(started.elapsed());
        }

        // 5 ms x (6 - 2)^2 = 80 ms, under the 200 ms cap.
        assert!(
            elapsed[5] >= Duration::from_millis(80),
            "sixth registration returned after {:?}",
            elapsed[5]
        );
        assert!(
            elapsed[5] < Duration::from_millis(200),
            "sixth registration blocked {:?}",
            elapsed[5]
        );
        // The first two stay under the threshold entirely.
        assert!(elapsed[0] < Duration::from_millis(50));
        assert!(elapsed[1] < Duration::from_millis(50));

        let _ = resume_tx.send(());
    });
    pipeline.terminate();
}
