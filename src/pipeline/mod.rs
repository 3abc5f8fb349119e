//! Pipeline stages for zip-to-PDF conversion.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the render backend can be swapped without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ store ──▶ extract ──▶ render
//! (sniff)     (disk)    (zip)       (engine + persist)
//! ```
//!
//! 1. [`validate`]: sniff the first 512 bytes; only zip archives pass
//! 2. [`store`]: stream the upload to `<uploads>/<job-id>.zip`
//! 3. [`extract`]: materialise regular files under `<extract>/<job-id>/`;
//!    runs in `spawn_blocking`
//! 4. [`render`]: hand `index.html` to the engine and write the PDF
//!
//! Steps 1 and 2 run while the request is open. Steps 3 and 4 run after the
//! client has its response, inside a job task.

pub mod extract;
pub mod render;
pub mod store;
pub mod validate;
