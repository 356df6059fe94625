//! Maximum local-anaesthetic cartridge calculator.
//!
//! The ceiling is the smaller of the anaesthetic limit (mg/kg capped at an
//! absolute maximum) and the vasoconstrictor limit, per 1.8 ml cartridge.

use serde::{Deserialize, Serialize};

pub const ML_PER_CARTRIDGE: f64 = 1.8;

#[derive(Debug, Clone, Copy)]
struct Anesthetic {
    key: &'static str,
    mg_kg: f64,
    mg_max: f64,
}

const ANESTHETICS: &[Anesthetic] = &[
    Anesthetic { key: "lidocaina", mg_kg: 4.4, mg_max: 300.0 },
    Anesthetic { key: "mepivacaina", mg_kg: 4.4, mg_max: 300.0 },
    Anesthetic { key: "articaina", mg_kg: 7.0, mg_max: 500.0 },
    Anesthetic { key: "prilocaina", mg_kg: 6.0, mg_max: 400.0 },
    Anesthetic { key: "bupivacaina", mg_kg: 1.3, mg_max: 90.0 },
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum VasoLimit {
    /// Total mg for a healthy adult.
    Milligrams(f64),
    /// Felypressin, in IU per kg with an absolute cap.
    UnitsPerKg { per_kg: f64, max: f64 },
}

const FELYPRESSIN: &str = "felypressina";

fn vaso_limit(key: &str) -> Option<VasoLimit> {
    match key {
        "epinefrina" => Some(VasoLimit::Milligrams(0.2)),
        "norepinefrina" => Some(VasoLimit::Milligrams(0.34)),
        "fenilefrina" => Some(VasoLimit::Milligrams(5.0)),
        FELYPRESSIN => Some(VasoLimit::UnitsPerKg {
            per_kg: 0.27,
            max: 5.4,
        }),
        _ => None,
    }
}

fn normalize_vaso(raw: Option<&str>) -> String {
    let key = raw.map(|v| v.trim().to_lowercase()).unwrap_or_default();
    match key.as_str() {
        "" => "nenhum".into(),
        "felipressina" => FELYPRESSIN.into(),
        _ => key,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Defaults {
    pub peso: f64,
    pub anestesico: &'static str,
    pub concentracao: f64,
    pub vaso: &'static str,
    pub conc_vaso: f64,
}

pub const DEFAULTS: Defaults = Defaults {
    peso: 70.0,
    anestesico: "lidocaina",
    concentracao: 2.0,
    vaso: "epinefrina",
    conc_vaso: 0.01,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VasoOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// Commercial concentrations available for a vasoconstrictor.
pub fn conc_vaso_options(vaso: &str) -> Vec<VasoOption> {
    let opts: &[(&'static str, &'static str)] = match normalize_vaso(Some(vaso)).as_str() {
        "epinefrina" => &[
            ("0.01", "1:100.000 (0,01 mg/ml)"),
            ("0.005", "1:200.000 (0,005 mg/ml)"),
        ],
        "norepinefrina" => &[("0.033", "1:30.000 (0,033 mg/ml)")],
        "fenilefrina" => &[("0.4", "1:2.500 (0,4 mg/ml)")],
        FELYPRESSIN => &[("0.03", "0,03 UI/ml")],
        _ => &[],
    };
    opts.iter()
        .map(|&(value, label)| VasoOption { value, label })
        .collect()
}

/// Raw form values; numbers accept a decimal comma.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalcInput {
    pub peso: Option<String>,
    pub anestesico: Option<String>,
    pub concentracao: Option<String>,
    pub vaso: Option<String>,
    pub conc_vaso: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalcResult {
    pub peso: f64,
    pub anestesico: String,
    pub concentracao: f64,
    pub vaso: String,
    pub conc_vaso: Option<f64>,
    pub dose_max_mg: f64,
    pub mg_por_tubete_anest: f64,
    pub ml_tubete: f64,
    pub tubetes_max_anest: f64,
    pub tubetes_max_vaso: Option<f64>,
    pub tubetes_final: f64,
    pub criterio: &'static str,
}

/// Every validation message, in form order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .0.join(" "))]
pub struct CalcError(pub Vec<&'static str>);

fn parse_decimal(raw: Option<&str>) -> Option<f64> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    raw.replace(',', ".").parse().ok()
}

pub fn calculate(input: &CalcInput) -> Result<CalcResult, CalcError> {
    let peso = parse_decimal(input.peso.as_deref()).unwrap_or(0.0);
    let anestesico = input
        .anestesico
        .as_deref()
        .map(|a| a.trim().to_lowercase())
        .unwrap_or_default();
    let concentracao = parse_decimal(input.concentracao.as_deref()).unwrap_or(0.0);
    let vaso = normalize_vaso(input.vaso.as_deref());
    let conc_vaso = parse_decimal(input.conc_vaso.as_deref());

    let anesthetic = ANESTHETICS.iter().find(|a| a.key == anestesico);
    let mut errors = Vec::new();
    if peso <= 0.0 {
        errors.push("Informe um peso válido.");
    }
    if anesthetic.is_none() {
        errors.push("Tipo de anestésico inválido.");
    }
    if concentracao <= 0.0 {
        errors.push("Informe a concentração do anestésico (%).");
    }
    if vaso != "nenhum" && conc_vaso.is_none() {
        errors.push("Selecione a concentração do vasoconstrictor.");
    }
    let Some(anesthetic) = anesthetic.filter(|_| errors.is_empty()) else {
        return Err(CalcError(errors));
    };

    let dose_max_mg = (peso * anesthetic.mg_kg).min(anesthetic.mg_max);
    let mg_por_tubete_anest = concentracao * 10.0 * ML_PER_CARTRIDGE;
    let tubetes_max_anest = dose_max_mg / mg_por_tubete_anest;

    let per_cartridge = conc_vaso.unwrap_or(0.0) * ML_PER_CARTRIDGE;
    let tubetes_max_vaso = vaso_limit(&vaso)
        .map(|limit| match limit {
            VasoLimit::Milligrams(max) => max,
            VasoLimit::UnitsPerKg { per_kg, max } => (per_kg * peso).min(max),
        })
        .filter(|_| per_cartridge > 0.0)
        .map(|max| max / per_cartridge);

    let (tubetes_final, criterio) = match tubetes_max_vaso {
        Some(v) if v < tubetes_max_anest => (v, "vasoconstrictor"),
        _ => (tubetes_max_anest, "anestésico local"),
    };

    Ok(CalcResult {
        peso,
        anestesico,
        concentracao,
        vaso,
        conc_vaso,
        dose_max_mg,
        mg_por_tubete_anest,
        ml_tubete: ML_PER_CARTRIDGE,
        tubetes_max_anest,
        tubetes_max_vaso,
        tubetes_final,
        criterio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(peso: &str, anest: &str, conc: &str, vaso: &str, conc_vaso: Option<&str>) -> CalcInput {
        CalcInput {
            peso: Some(peso.into()),
            anestesico: Some(anest.into()),
            concentracao: Some(conc.into()),
            vaso: Some(vaso.into()),
            conc_vaso: conc_vaso.map(Into::into),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn lidocaine_with_epinephrine_is_anaesthetic_bound() {
        let r = calculate(&input("70", "lidocaina", "2", "epinefrina", Some("0.01"))).unwrap();
        // 70 kg * 4.4 = 308 mg, capped at 300; 36 mg per cartridge
        assert!(close(r.dose_max_mg, 300.0));
        assert!(close(r.mg_por_tubete_anest, 36.0));
        assert!(close(r.tubetes_max_anest, 300.0 / 36.0));
        assert!(close(r.tubetes_max_vaso.unwrap(), 0.2 / 0.018));
        assert_eq!(r.criterio, "anestésico local");
        assert!(close(r.tubetes_final, r.tubetes_max_anest));
    }

    #[test]
    fn vasoconstrictor_can_decide() {
        let r = calculate(&input("80", "articaina", "4", "norepinefrina", Some("0,033"))).unwrap();
        // 0.34 / (0.033 * 1.8) ≈ 5.72 < 500 / 72 ≈ 6.94
        assert_eq!(r.criterio, "vasoconstrictor");
        assert!(close(r.tubetes_final, 0.34 / (0.033 * 1.8)));
    }

    #[test]
    fn felypressin_uses_units_per_kg_and_accepts_both_spellings() {
        let a = calculate(&input("10", "prilocaina", "3", "felipressina", Some("0.03"))).unwrap();
        assert_eq!(a.vaso, "felypressina");
        assert!(close(a.tubetes_max_vaso.unwrap(), 2.7 / 0.054));

        let b = calculate(&input("50", "prilocaina", "3", "felypressina", Some("0.03"))).unwrap();
        // 0.27 * 50 = 13.5 IU, capped at 5.4
        assert!(close(b.tubetes_max_vaso.unwrap(), 5.4 / 0.054));
    }

    #[test]
    fn without_vasoconstrictor() {
        let mut i = input("60", "bupivacaina", "0,5", "nenhum", None);
        let r = calculate(&i).unwrap();
        assert_eq!(r.tubetes_max_vaso, None);
        assert_eq!(r.criterio, "anestésico local");

        i.vaso = None;
        assert!(calculate(&i).is_ok());

        // Zero concentration gives no vasoconstrictor limit
        let r = calculate(&input("60", "lidocaina", "2", "epinefrina", Some("0"))).unwrap();
        assert_eq!(r.tubetes_max_vaso, None);
    }

    #[test]
    fn all_errors_reported_together() {
        let err = calculate(&input("0", "xilo", "", "epinefrina", None)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Informe um peso válido. Tipo de anestésico inválido. \
             Informe a concentração do anestésico (%). \
             Selecione a concentração do vasoconstrictor."
        );
    }

    #[test]
    fn options_per_vasoconstrictor() {
        assert_eq!(conc_vaso_options("Epinefrina").len(), 2);
        assert_eq!(conc_vaso_options("felipressina")[0].label, "0,03 UI/ml");
        assert!(conc_vaso_options("nenhum").is_empty());
    }
}
