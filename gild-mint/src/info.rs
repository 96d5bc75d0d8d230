//! Builds the Nut-06 info response from the mint configuration.

use gild_core::primitives::{
    ContactInfoResponse, CurrencyUnit, MintInfoResponse, MppMethodConfig, MppSettings,
    NutSupported, Nuts, PaymentMethod, PaymentMethodConfig, PaymentMethodSettings,
};

use crate::config::MintConfig;

pub fn mint_info(config: &MintConfig) -> MintInfoResponse {
    let contact = config.info.contact_email.as_ref().map(|email| {
        vec![ContactInfoResponse {
            method: "email".to_string(),
            info: email.clone(),
        }]
    });

    MintInfoResponse {
        name: config.info.name.clone(),
        pubkey: None,
        version: Some(format!("gild/{}", env!("CARGO_PKG_VERSION"))),
        description: config.info.description.clone(),
        description_long: config.info.description_long.clone(),
        contact,
        motd: config.info.motd.clone(),
        nuts: supported_nuts(config),
    }
}

fn supported_nuts(config: &MintConfig) -> Nuts {
    let bolt11_sat = PaymentMethodConfig {
        method: PaymentMethod::Bolt11,
        unit: CurrencyUnit::Sat,
        min_amount: Some(config.limits.mint_min_sat),
        max_amount: Some(config.limits.mint_max_sat),
    };

    Nuts {
        nut4: PaymentMethodSettings {
            methods: vec![bolt11_sat.clone()],
            disabled: false,
        },
        nut5: PaymentMethodSettings {
            methods: vec![bolt11_sat],
            disabled: false,
        },
        nut7: NutSupported { supported: true },
        nut8: NutSupported { supported: true },
        nut9: NutSupported { supported: true },
        nut10: NutSupported { supported: true },
        nut11: NutSupported { supported: true },
        nut12: NutSupported { supported: true },
        nut14: NutSupported { supported: true },
        nut15: MppSettings {
            methods: vec![MppMethodConfig {
                method: PaymentMethod::Bolt11,
                unit: CurrencyUnit::Sat,
            }],
        },
    }
}
