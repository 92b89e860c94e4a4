//! Connected-component labelling of equal-valued pixels (4-connectivity).

/// Label assigned to pixels that belong to no component.
pub const UNLABELED: u32 = u32::MAX;

/// A labelled component: its value and the row-major indices of its pixels.
#[derive(Clone, Debug)]
pub struct Component {
    pub value:  f32,
    pub pixels: Vec<usize>,
}

/// Label every pixel accepted by `keep`, grouping 4-adjacent pixels that carry
/// exactly the same value.  Components are numbered in row-major order of
/// their first pixel, so the output is deterministic for a given grid.
pub fn label_components<F>(data: &[f32], width: usize, height: usize, keep: F) -> (Vec<u32>, Vec<Component>)
where
    F: Fn(f32) -> bool,
{
    debug_assert_eq!(data.len(), width * height);

    let mut labels = vec![UNLABELED; data.len()];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for start in 0..data.len() {
        if labels[start] != UNLABELED || !keep(data[start]) { continue }

        let id = components.len() as u32;
        let value = data[start];
        let mut pixels = Vec::new();

        labels[start] = id;
        stack.push(start);
        while let Some(idx) = stack.pop() {
            pixels.push(idx);
            let (col, row) = (idx % width, idx / width);

            let mut visit = |n: usize| {
                if labels[n] == UNLABELED && data[n] == value {
                    labels[n] = id;
                    stack.push(n);
                }
            };
            if col > 0 { visit(idx - 1) }
            if col + 1 < width { visit(idx + 1) }
            if row > 0 { visit(idx - width) }
            if row + 1 < height { visit(idx + width) }
        }

        pixels.sort_unstable();
        components.push(Component { value, pixels });
    }

    (labels, components)
}
