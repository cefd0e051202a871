//! Cycle-by-cycle waveform capture and WaveDrom rendering.
//!
//! A [`WaveForm`] keeps one append-only sample log per tracked field plus a
//! synthetic clock. [`WaveForm::render`] compresses the logs into the
//! WaveDrom JSON form used for golden-file comparison:
//!
//! - the clock is `p` followed by one `.` per further cycle;
//! - levels are `0`/`1`, with `.` while unchanged;
//! - vectors are `=` on every change, with the new value appended to the
//!   field's `data` list as a lowercase `0x` literal.
//!
//! Output is a pure function of the sampled values, so identical cycle
//! sequences render to identical bytes.

use serde::Serialize;

use crate::{BusDescriptor, SignalBundle, SignalField, SignalValue, TraceFormatError};

/// Default clock field name.
pub const CLOCK_NAME: &str = "PCLK";

/// Source of per-cycle field values.
pub trait Probe {
    /// Value of `field` this cycle, or `None` if the source has no such wire.
    fn probe(&self, field: SignalField) -> Option<SignalValue>;
}

impl Probe for SignalBundle {
    fn probe(&self, field: SignalField) -> Option<SignalValue> {
        self.value(field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Track {
    field: SignalField,
    samples: Vec<Option<SignalValue>>,
}

/// Append-only multi-field trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveForm {
    clock_name: String,
    cycles: usize,
    tracks: Vec<Track>,
}

#[derive(Serialize)]
struct WaveJson<'a> {
    signal: Vec<WaveSignal<'a>>,
}

#[derive(Serialize)]
struct WaveSignal<'a> {
    name: &'a str,
    wave: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    data: Vec<String>,
}

impl WaveForm {
    /// Empty trace of `fields`, rendered in the given order after the clock.
    #[must_use]
    pub fn new(
        clock_name: impl Into<String>,
        fields: impl IntoIterator<Item = SignalField>,
    ) -> Self {
        Self {
            clock_name: clock_name.into(),
            cycles: 0,
            tracks: fields
                .into_iter()
                .map(|field| Track {
                    field,
                    samples: Vec::new(),
                })
                .collect(),
        }
    }

    /// Empty trace of every field of a bus, in declaration order, clocked by `PCLK`.
    #[must_use]
    pub fn for_bus(descriptor: &BusDescriptor) -> Self {
        Self::new(CLOCK_NAME, descriptor.fields().iter().map(|spec| spec.field))
    }

    /// Records one cycle.
    ///
    /// Call once per simulated cycle, after the controller and any responder
    /// have committed that cycle's outputs.
    pub fn sample<P: Probe + ?Sized>(&mut self, source: &P) {
        self.cycles += 1;
        for track in &mut self.tracks {
            track.samples.push(source.probe(track.field));
        }
    }

    /// Number of recorded cycles.
    #[must_use]
    pub const fn cycles(&self) -> usize {
        self.cycles
    }

    /// Clock field name.
    #[must_use]
    pub fn clock_name(&self) -> &str {
        &self.clock_name
    }

    /// Tracked fields in render order.
    pub fn fields(&self) -> impl Iterator<Item = SignalField> + '_ {
        self.tracks.iter().map(|track| track.field)
    }

    /// Raw samples of one field, `None` entries marking cycles the probe had no value.
    #[must_use]
    pub fn samples(&self, field: SignalField) -> Option<&[Option<SignalValue>]> {
        self.tracks
            .iter()
            .find(|track| track.field == field)
            .map(|track| track.samples.as_slice())
    }

    /// Renders the trace as four-space-indented WaveDrom JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TraceFormatError`] when any sample is missing, does not fit
    /// its declared width, or changes kind mid-trace. No partial output is
    /// produced.
    pub fn render(&self) -> Result<String, TraceFormatError> {
        let mut signal = Vec::with_capacity(self.tracks.len() + 1);
        signal.push(WaveSignal {
            name: &self.clock_name,
            wave: clock_wave(self.cycles),
            data: Vec::new(),
        });
        let names: Vec<String> = self
            .tracks
            .iter()
            .map(|track| track.field.name().into_owned())
            .collect();
        for (track, name) in self.tracks.iter().zip(&names) {
            let (wave, data) = encode_track(track)?;
            signal.push(WaveSignal { name, wave, data });
        }

        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        WaveJson { signal }
            .serialize(&mut serializer)
            .map_err(|err| TraceFormatError::Encoding(err.to_string()))?;
        String::from_utf8(out).map_err(|err| TraceFormatError::Encoding(err.to_string()))
    }

    /// Renders a standalone HTML page that draws the trace with WaveDrom.
    ///
    /// # Errors
    ///
    /// Same conditions as [`WaveForm::render`].
    pub fn render_html(&self) -> Result<String, TraceFormatError> {
        let json = self.render()?;
        Ok(format!(
            r#"<html>
    <head>
        <script src="https://wavedrom.com/skins/default.js" type="text/javascript"></script>
        <script src="https://wavedrom.com/wavedrom.min.js" type="text/javascript"></script>
    </head>
    <body onload="WaveDrom.ProcessAll()">
        <script type="WaveDrom">
{json}
        </script>
    </body>
</html>
"#
        ))
    }
}

fn clock_wave(cycles: usize) -> String {
    if cycles == 0 {
        return String::new();
    }
    let mut wave = String::with_capacity(cycles);
    wave.push('p');
    wave.push_str(&".".repeat(cycles - 1));
    wave
}

fn encode_track(track: &Track) -> Result<(String, Vec<String>), TraceFormatError> {
    let field = track.field;
    let mut wave = String::with_capacity(track.samples.len());
    let mut data = Vec::new();
    let mut previous: Option<SignalValue> = None;

    for (cycle, sample) in track.samples.iter().copied().enumerate() {
        let value = sample.ok_or(TraceFormatError::MissingValue { field, cycle })?;
        if let SignalValue::Bits { value, width } = value {
            if !fits(value, width) {
                return Err(TraceFormatError::ValueOutOfRange {
                    field,
                    value,
                    width,
                });
            }
        }
        if previous.is_some_and(|prev| prev.kind() != value.kind()) {
            return Err(TraceFormatError::KindChanged { field, cycle });
        }

        if previous == Some(value) {
            wave.push('.');
        } else {
            match value {
                SignalValue::Bit(level) => wave.push(if level { '1' } else { '0' }),
                SignalValue::Bits { value, .. } => {
                    wave.push('=');
                    data.push(format!("{value:#x}"));
                }
            }
        }
        previous = Some(value);
    }
    Ok((wave, data))
}

const fn fits(value: u64, width: u8) -> bool {
    match width {
        0 => false,
        64.. => true,
        _ => value >> width == 0,
    }
}
