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

use std::sync::Arc;
use std::time::Duration;
use tributary::core::config::PipelineConfig;
use tributary::core::virtualmap::{
    SledDataSource, VirtualDataSource, VirtualMap, VirtualPipeline, VirtualRoot,
};

fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("condition never held");
}

#[test]
fn flushed_copies_survive_in_sled() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(SledDataSource::open(dir.path().to_str().unwrap()).unwrap());
    let pipeline = VirtualPipeline::new(PipelineConfig::default(), None);
    let map = VirtualMap::new(source.clone());

    map.put(b"alpha".to_vec(), b"1".to_vec()).unwrap();
    map.put(b"beta".to_vec(), b"2".to_vec()).unwrap();
    let first = map.fast_copy();
    first.set_should_flush(true);
    pipeline.register_copy(first.clone()).unwrap();

    map.put(b"beta".to_vec(), b"3".to_vec()).unwrap();
    map.delete(b"alpha".to_vec()).unwrap();
    let second = map.fast_copy();
    second.set_should_flush(true);
    pipeline.register_copy(second.clone()).unwrap();

    first.release();
    pipeline.release_copy(&first).unwrap();
    second.release();
    pipeline.release_copy(&second).unwrap();
    wait_until(|| pipeline.is_empty());
    pipeline.terminate();

    assert!(first.is_flushed());
    assert!(second.is_flushed());
    assert_eq!(source.load(b"beta").unwrap(), Some(b"3".to_vec()));
    assert_eq!(source.load(b"alpha").unwrap(), None);

    // Reads now come from the store, not from the drained chain.
    map.prune();
    assert_eq!(map.get(b"beta").unwrap(), Some(b"3".to_vec()));
    assert_eq!(map.get(b"alpha").unwrap(), None);
}

#[test]
fn copies_are_hashed_before_they_flush() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(SledDataSource::open(dir.path().to_str().unwrap()).unwrap());
    let pipeline = VirtualPipeline::new(PipelineConfig::default(), None);
    let map = VirtualMap::new(source);

    map.put(b"k".to_vec(), b"v".to_vec()).unwrap();
    let copy = map.fast_copy();
    copy.set_should_flush(true);
    pipeline.register_copy(copy.clone()).unwrap();
    wait_until(|| copy.is_flushed());
    assert!(copy.is_hashed());
    assert!(copy.hash().is_some());
    pipeline.terminate();
}
