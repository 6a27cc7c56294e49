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

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use tributary::core::codec::streams::{
    read_bool_list, read_byte_array, read_double_list, read_instant, read_int_list,
    read_long_list, read_normalised_string, read_string_list,
};

fuzz_target!(|data: &[u8]| {
    // Every decoder must reject hostile prefixes without panicking or
    // allocating past its limit.
    let _ = read_byte_array(&mut Cursor::new(data), 1024, false);
    let _ = read_byte_array(&mut Cursor::new(data), 1024, true);
    let _ = read_int_list(&mut Cursor::new(data), 256);
    let _ = read_long_list(&mut Cursor::new(data), 256);
    let _ = read_bool_list(&mut Cursor::new(data), 256);
    let _ = read_double_list(&mut Cursor::new(data), 256);
    let _ = read_string_list(&mut Cursor::new(data), 64, 256);
    let _ = read_normalised_string(&mut Cursor::new(data), 1024);
    let _ = read_instant(&mut Cursor::new(data));
});
