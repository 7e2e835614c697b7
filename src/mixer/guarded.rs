use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::utils::buffer::OutputBuffer;

// -------------------------------------------------------------------------------------------------

/// Something that renders audio into host output buffers.
pub trait AudioRenderer: Send + 'static {
    fn render<B: OutputBuffer>(&mut self, output: &mut B);
}

// -------------------------------------------------------------------------------------------------

/// A wrapper renderer that catches panics from an inner renderer.
///
/// Should only be used by output devices. After the wrapped renderer panicked it is no
/// longer getting called and the output stays silent.
pub struct GuardedRenderer<R: AudioRenderer> {
    renderer: R,
    name: &'static str,
    panicked: bool,
}

impl<R: AudioRenderer> GuardedRenderer<R> {
    pub fn new(renderer: R, name: &'static str) -> Self {
        Self {
            renderer,
            name,
            panicked: false,
        }
    }

    /// True when the wrapped renderer panicked.
    pub fn panicked(&self) -> bool {
        self.panicked
    }

    /// Access the wrapped renderer.
    pub fn inner(&self) -> &R {
        &self.renderer
    }
}

impl<R: AudioRenderer> AudioRenderer for GuardedRenderer<R> {
    fn render<B: OutputBuffer>(&mut self, output: &mut B) {
        if self.panicked {
            output.clear();
            return;
        }
        let renderer = &mut self.renderer;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| renderer.render(&mut *output))) {
            self.panicked = true;
            log::error!(
                "Ouch. {} panicked: {}",
                self.name,
                panic_message::panic_message(&payload)
            );
            output.clear();
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::buffer::InterleavedBuffer;

    struct Faulty {
        calls: usize,
    }

    impl AudioRenderer for Faulty {
        fn render<B: OutputBuffer>(&mut self, output: &mut B) {
            self.calls += 1;
            let mix = vec![vec![0.5; output.frame_count()]; output.channel_count()];
            output.write_planar(0, &mix, output.frame_count());
            if self.calls == 2 {
                panic!("faulty renderer");
            }
        }
    }

    #[test]
    fn silences_after_panic() {
        let mut guarded = GuardedRenderer::new(Faulty { calls: 0 }, "faulty renderer");
        let mut samples = vec![0.0_f32; 8];

        guarded.render(&mut InterleavedBuffer::new(&mut samples, 2));
        assert!(samples.iter().all(|s| *s == 0.5));
        assert!(!guarded.panicked());

        guarded.render(&mut InterleavedBuffer::new(&mut samples, 2));
        assert!(guarded.panicked());
        assert!(samples.iter().all(|s| *s == 0.0));

        samples.fill(1.0);
        guarded.render(&mut InterleavedBuffer::new(&mut samples, 2));
        assert!(samples.iter().all(|s| *s == 0.0));
        assert_eq!(guarded.inner().calls, 2);
    }
}
