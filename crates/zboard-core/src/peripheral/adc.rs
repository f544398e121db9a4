//! ADC settings
//!
//! References and gains are written by users as short strings ("internal",
//! "1/6") and end up in generated code as Zephyr enum names
//! (`ADC_REF_INTERNAL`, `ADC_GAIN_1_6`).

use core::fmt;
use std::str::FromStr;

use crate::error::Error;

macro_rules! adc_setting {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, $zephyr:literal; )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
        #[serde(try_from = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every value, in table order
            pub const ALL: &'static [$name] = &[$( $name::$variant, )+];

            /// Spelling used in request files
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }

            /// Zephyr enum name used in generated code
            pub fn zephyr_name(&self) -> &'static str {
                match self {
                    $( Self::$variant => $zephyr, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Error> {
                let s = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| Error::InvalidSetting {
                        field: $field,
                        value: s.to_string(),
                        valid: Self::ALL.iter().map(|v| v.to_string()).collect(),
                    })
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(s: String) -> Result<Self, Error> {
                s.parse()
            }
        }
    };
}

adc_setting! {
    /// ADC voltage reference
    AdcReference, "reference" {
        /// VDD
        Vdd1 => "vdd_1", "ADC_REF_VDD_1";
        /// VDD/2
        Vdd1_2 => "vdd_1/2", "ADC_REF_VDD_1_2";
        /// VDD/3
        Vdd1_3 => "vdd_1/3", "ADC_REF_VDD_1_3";
        /// VDD/4
        Vdd1_4 => "vdd_1/4", "ADC_REF_VDD_1_4";
        /// Internal reference
        Internal => "internal", "ADC_REF_INTERNAL";
        /// External, input 0
        External0 => "external0", "ADC_REF_EXTERNAL0";
        /// External, input 1
        External1 => "external1", "ADC_REF_EXTERNAL1";
    }
}

adc_setting! {
    /// ADC input gain
    AdcGain, "gain" {
        /// 1/6
        Gain1_6 => "1/6", "ADC_GAIN_1_6";
        /// 1/5
        Gain1_5 => "1/5", "ADC_GAIN_1_5";
        /// 1/4
        Gain1_4 => "1/4", "ADC_GAIN_1_4";
        /// 1/3
        Gain1_3 => "1/3", "ADC_GAIN_1_3";
        /// 1/2
        Gain1_2 => "1/2", "ADC_GAIN_1_2";
        /// 2/3
        Gain2_3 => "2/3", "ADC_GAIN_2_3";
        /// Unity gain
        Gain1 => "1", "ADC_GAIN_1";
        /// 2
        Gain2 => "2", "ADC_GAIN_2";
        /// 3
        Gain3 => "3", "ADC_GAIN_3";
        /// 4
        Gain4 => "4", "ADC_GAIN_4";
        /// 6
        Gain6 => "6", "ADC_GAIN_6";
        /// 8
        Gain8 => "8", "ADC_GAIN_8";
        /// 12
        Gain12 => "12", "ADC_GAIN_12";
        /// 16
        Gain16 => "16", "ADC_GAIN_16";
        /// 24
        Gain24 => "24", "ADC_GAIN_24";
        /// 32
        Gain32 => "32", "ADC_GAIN_32";
        /// 64
        Gain64 => "64", "ADC_GAIN_64";
        /// 128
        Gain128 => "128", "ADC_GAIN_128";
    }
}

impl Default for AdcReference {
    fn default() -> Self {
        Self::Internal
    }
}

impl Default for AdcGain {
    fn default() -> Self {
        Self::Gain1
    }
}
