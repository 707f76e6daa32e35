//! WGSL sources of the kernel programs.
//!
//! Every program shares the same vertex stage and fragment entry point. Only
//! the sampled input declarations and the kernel's `compute` function vary.

/// Vertex stage entry point.
pub const VERTEX_ENTRY: &str = "vs_main";

/// Fragment stage entry point.
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Vertices drawn per dispatch.
pub const QUAD_VERTEX_COUNT: u32 = 4;

/// Binding index of the first input texture.
pub const FIRST_INPUT_BINDING: u32 = 1;

/// Composes the full shader module of a kernel program.
///
/// # Arguments
/// * `compute` - WGSL defining `fn compute(idx: u32) -> f32`
/// * `input_count` - number of input textures, declared as `data1..dataK`
pub fn get_program_wgsl(compute: &str, input_count: usize) -> String {
    let mut inputs = String::new();
    for k in 0..input_count {
        inputs.push_str(&format!(
            "@group(0) @binding({binding}) var data{name}: texture_2d<f32>;\n",
            binding = FIRST_INPUT_BINDING as usize + k,
            name = k + 1
        ));
    }
    format!(
        r#"{quad}
{fetch}
{inputs}
{compute}
{main}"#,
        quad = include_str!("quad.wgsl"),
        fetch = include_str!("fetch.wgsl"),
        inputs = inputs,
        compute = compute,
        main = include_str!("main.wgsl"),
    )
}
