// Static clinic data: contact details, specializations, doctors, appointment
// slots and the news feed.
//
// The defaults describe the "Здоровье+" medical centre. Deployments can replace
// them with a JSON file (see `ClinicCatalog::from_json_file`).

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contact and presentation details shown on the "about the clinic" screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicInfo {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub website: String,
    pub working_hours: String,
    pub map_url: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub name: String,
    pub experience: String,
    /// Emoji used as an avatar in message texts.
    pub photo: String,
    pub description: String,
}

impl Doctor {
    /// First word of the full name (the surname), used on compact buttons.
    pub fn surname(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

/// Doctors practicing one specialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistGroup {
    pub specialization: String,
    pub doctors: Vec<Doctor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicCatalog {
    pub info: ClinicInfo,
    /// Every specialization offered in the booking menu, in display order.
    pub specializations: Vec<String>,
    /// Specializations that currently have doctors. May be a subset of `specializations`.
    pub doctors: Vec<SpecialistGroup>,
    /// Bookable appointment times (`HH:MM`), in display order.
    pub available_times: Vec<String>,
    #[serde(default)]
    pub news: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid catalog JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Catalog has no {0}")]
    Empty(&'static str),
}

impl ClinicCatalog {
    /// Load a catalog override from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: ClinicCatalog = serde_json::from_str(json)?;
        if catalog.specializations.is_empty() {
            return Err(CatalogError::Empty("specializations"));
        }
        if catalog.available_times.is_empty() {
            return Err(CatalogError::Empty("available times"));
        }
        Ok(catalog)
    }

    pub fn specialization(&self, index: usize) -> Option<&str> {
        self.specializations.get(index).map(String::as_str)
    }

    /// Doctors for a specialization; empty when nobody practices it right now.
    pub fn doctors_for(&self, specialization: &str) -> &[Doctor] {
        self.doctors
            .iter()
            .find(|g| g.specialization == specialization)
            .map(|g| g.doctors.as_slice())
            .unwrap_or(&[])
    }

    /// Resolve a (specialization index, doctor index) pair from callback data.
    pub fn doctor(&self, spec_index: usize, doctor_index: usize) -> Option<(&str, &Doctor)> {
        let specialization = self.specialization(spec_index)?;
        let doctor = self.doctors_for(specialization).get(doctor_index)?;
        Some((specialization, doctor))
    }
}

impl Default for ClinicCatalog {
    fn default() -> Self {
        fn doctor(name: &str, experience: &str, photo: &str, description: &str) -> Doctor {
            Doctor {
                name: name.to_string(),
                experience: experience.to_string(),
                photo: photo.to_string(),
                description: description.to_string(),
            }
        }

        let available_times = (9..20)
            .flat_map(|hour| [format!("{hour:02}:00"), format!("{hour:02}:30")])
            .collect();

        Self {
            info: ClinicInfo {
                name: "Медицинский центр Здоровье+".to_string(),
                address: "г. Москва, ул. Медицинская, д. 15".to_string(),
                phone: "+7 (495) 123-45-67".to_string(),
                website: "https://zdorovie-plus.ru".to_string(),
                working_hours: "Пн-Пт: 8:00-20:00\nСб-Вс: 9:00-18:00".to_string(),
                map_url: "https://maps.google.com/?q=Москва,ул.Медицинская,д.15".to_string(),
                email: Some("info@zdorovie-plus.ru".to_string()),
                description: Some(
                    "Современный многопрофильный центр, где сочетаются опытные специалисты, \
                     современное оборудование и индивидуальный подход. Мы проводим диагностику, \
                     лечение и профилактику по ключевым направлениям: терапия, кардиология, \
                     неврология, стоматология и др. Заботимся о комфортной и безопасной среде \
                     для пациентов любого возраста."
                        .to_string(),
                ),
            },
            specializations: [
                "Терапевт",
                "Стоматолог",
                "Кардиолог",
                "Невролог",
                "Офтальмолог",
                "Ортопед",
                "Гинеколог",
                "Уролог",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            doctors: vec![
                SpecialistGroup {
                    specialization: "Терапевт".to_string(),
                    doctors: vec![
                        doctor(
                            "Иванов Иван Иванович",
                            "15 лет",
                            "👨‍⚕️",
                            "Врач-терапевт высшей категории",
                        ),
                        doctor(
                            "Петрова Анна Сергеевна",
                            "12 лет",
                            "👩‍⚕️",
                            "Врач-терапевт первой категории",
                        ),
                    ],
                },
                SpecialistGroup {
                    specialization: "Стоматолог".to_string(),
                    doctors: vec![doctor(
                        "Сидоров Петр Александрович",
                        "20 лет",
                        "👨‍⚕️",
                        "Врач-стоматолог высшей категории",
                    )],
                },
                SpecialistGroup {
                    specialization: "Кардиолог".to_string(),
                    doctors: vec![doctor(
                        "Козлова Елена Владимировна",
                        "18 лет",
                        "👩‍⚕️",
                        "Врач-кардиолог высшей категории",
                    )],
                },
            ],
            available_times,
            news: vec![
                "🎉 Только в августе! Консультация кардиолога за 500₽ вместо 1000₽".to_string(),
                "🆕 Новый врач-невролог в нашей клинике".to_string(),
                "💉 Акция на анализы крови - скидка 20%".to_string(),
            ],
        }
    }
}
