// Click sounds - Pre-generated percussive one-shots
// Every sound is rendered once into a table at stream setup so the callback
// only has to copy samples

use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Available click timbres, addressed by string id in the settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClickSound {
    Click,
    Beep,
    Woodblock,
    Cowbell,
    Hihat,
    Rim,
}

impl ClickSound {
    pub const ALL: [ClickSound; 6] = [
        ClickSound::Click,
        ClickSound::Beep,
        ClickSound::Woodblock,
        ClickSound::Cowbell,
        ClickSound::Hihat,
        ClickSound::Rim,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            ClickSound::Click => "click",
            ClickSound::Beep => "beep",
            ClickSound::Woodblock => "woodblock",
            ClickSound::Cowbell => "cowbell",
            ClickSound::Hihat => "hihat",
            ClickSound::Rim => "rim",
        }
    }

    /// Case-insensitive lookup by id
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|sound| sound.id().eq_ignore_ascii_case(id.trim()))
    }

    fn index(&self) -> usize {
        *self as usize
    }

    /// Length of the one-shot in milliseconds
    fn duration_ms(&self) -> f32 {
        match self {
            ClickSound::Click => 15.0,
            ClickSound::Beep => 60.0,
            ClickSound::Woodblock => 35.0,
            ClickSound::Cowbell => 90.0,
            ClickSound::Hihat => 45.0,
            ClickSound::Rim => 25.0,
        }
    }
}

impl fmt::Display for ClickSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown sound id '{0}'")]
pub struct UnknownSound(pub String);

impl FromStr for ClickSound {
    type Err = UnknownSound;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| UnknownSound(s.to_string()))
    }
}

/// Accented clicks are pitched up by a fifth
const ACCENT_PITCH_RATIO: f32 = 1.5;

/// Xorshift noise source for the noisy timbres
struct Xorshift(u32);

impl Xorshift {
    fn next_noise(&mut self) -> f32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        (self.0 as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

/// Synthesize one click into a new buffer, peak around 1.0
fn synthesize(sound: ClickSound, accent: bool, sample_rate: f32) -> Vec<f32> {
    let num_samples = ((sound.duration_ms() / 1000.0) * sample_rate).max(1.0) as usize;
    let pitch = if accent { ACCENT_PITCH_RATIO } else { 1.0 };
    let mut noise = Xorshift(0x9E37_79B9);
    let mut previous_noise = 0.0f32;

    let sine = |freq: f32, i: usize| (2.0 * PI * freq * pitch * i as f32 / sample_rate).sin();
    let square = |freq: f32, i: usize| {
        if sine(freq, i) >= 0.0 { 1.0 } else { -1.0 }
    };

    (0..num_samples)
        .map(|i| {
            let t = i as f32 / num_samples as f32;
            match sound {
                ClickSound::Click => sine(1000.0, i) * (-t * 8.0).exp(),
                ClickSound::Beep => {
                    // Short attack to avoid a pop at the onset
                    let attack = (i as f32 / (0.002 * sample_rate)).min(1.0);
                    sine(880.0, i) * attack * (-t * 4.0).exp()
                }
                ClickSound::Woodblock => {
                    (sine(1800.0, i) * 0.8 + sine(2700.0, i) * 0.2) * (-t * 12.0).exp()
                }
                ClickSound::Cowbell => {
                    (square(540.0, i) + square(800.0, i)) * 0.3 * (-t * 5.0).exp()
                }
                ClickSound::Hihat => {
                    // First difference acts as a crude high-pass on the noise
                    let n = noise.next_noise();
                    let hp = n - previous_noise;
                    previous_noise = n;
                    hp * 0.5 * (-t * 10.0).exp()
                }
                ClickSound::Rim => {
                    (sine(1700.0, i) * 0.7 + noise.next_noise() * 0.3) * (-t * 14.0).exp()
                }
            }
        })
        .collect()
}

/// All click tables for one sample rate, regular and accented
#[derive(Debug, Clone)]
pub struct ClickBank {
    tables: Vec<Vec<f32>>,
}

impl ClickBank {
    pub fn new(sample_rate: f32) -> Self {
        let tables = ClickSound::ALL
            .iter()
            .flat_map(|&sound| {
                [
                    synthesize(sound, false, sample_rate),
                    synthesize(sound, true, sample_rate),
                ]
            })
            .collect();
        Self { tables }
    }

    /// Table id of a (sound, accent) pair
    #[inline]
    pub fn table_id(sound: ClickSound, accent: bool) -> usize {
        sound.index() * 2 + usize::from(accent)
    }

    #[inline]
    pub fn table(&self, table_id: usize) -> &[f32] {
        self.tables.get(table_id).map(|t| t.as_slice()).unwrap_or(&[])
    }

    pub fn samples(&self, sound: ClickSound, accent: bool) -> &[f32] {
        self.table(Self::table_id(sound, accent))
    }
}
