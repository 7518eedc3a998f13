//! CPAL backend for DC-coupled audio interfaces used as CV outputs.
//!
//! Each tick's frame is pushed into a ring; the device callback holds every
//! frame for `sample_rate / tick_hz` device samples (sample-and-hold) and
//! scales volts to the interface's full-scale level.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use cv_engine::{HardwareOutput, OutputFrame};
use cv_ir::{Channel, NUM_CHANNELS};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::traits::{CvOutput, OutputError};

pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    producer: HeapProd<OutputFrame>,
    consumer: Option<HeapCons<OutputFrame>>,
    pending: OutputFrame,
    running: Arc<AtomicBool>,
    full_scale: f32,
    tick_hz: u32,
}

impl CpalOutput {
    /// Open the default output device. `full_scale` is the voltage the
    /// interface produces at a sample value of 1.0.
    pub fn new(tick_hz: u32, full_scale: f32) -> Result<Self, OutputError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
        let config: StreamConfig = device
            .default_output_config()
            .map_err(|e| OutputError::DeviceInit(e.to_string()))?
            .into();
        if config.channels == 0 {
            return Err(OutputError::TooFewChannels(0));
        }

        // About 100ms of ticks
        let rb = HeapRb::<OutputFrame>::new((tick_hz as usize / 10).max(4));
        let (producer, consumer) = rb.split();

        Ok(Self {
            device,
            config,
            stream: None,
            producer,
            consumer: Some(consumer),
            pending: OutputFrame::zero(),
            running: Arc::new(AtomicBool::new(false)),
            full_scale: if full_scale > 0.0 { full_scale } else { 1.0 },
            tick_hz: tick_hz.max(1),
        })
    }

    fn build_stream(&mut self) -> Result<(), OutputError> {
        let Some(mut consumer) = self.consumer.take() else {
            return Ok(());
        };
        let running = self.running.clone();
        let channels = self.config.channels as usize;
        let hold = (self.config.sample_rate.0 / self.tick_hz).max(1);
        let gain = 1.0 / self.full_scale;
        let mut current = OutputFrame::zero();
        let mut held = 0u32;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    for chunk in data.chunks_mut(channels) {
                        if held == 0 {
                            // Underrun keeps the previous frame
                            if let Some(frame) = consumer.try_pop() {
                                current = frame;
                            }
                            held = hold;
                        }
                        held -= 1;
                        for (i, sample) in chunk.iter_mut().enumerate() {
                            *sample = if i < NUM_CHANNELS {
                                (current.volts[i] * gain).clamp(-1.0, 1.0)
                            } else {
                                0.0
                            };
                        }
                    }
                },
                |err| tracing::error!(error = %err, "CV stream error"),
                None,
            )
            .map_err(|e| OutputError::StreamCreate(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }
}

impl HardwareOutput for CpalOutput {
    fn write(&mut self, channel: Channel, volts: f32) {
        self.pending.set(channel, volts);
    }

    fn end_tick(&mut self) {
        // Non-blocking push; drop the frame if the device is behind
        let _ = self.producer.try_push(self.pending);
    }
}

impl CvOutput for CpalOutput {
    fn start(&mut self) -> Result<(), OutputError> {
        self.build_stream()?;
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.play().map_err(|e| OutputError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), OutputError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| OutputError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
